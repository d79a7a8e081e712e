//! Role protocol state machines for the Epiwatch surveillance simulation.
//!
//! Each of the three roles is a transport-free reactive state machine:
//! messages go in, replies and emissions come out, and the node binary
//! owns the sockets that carry them. All three share the same shape --
//! a vector clock, an archive of completed simulated days that drives
//! rollover detection, and a handful of per-tick duties -- and differ
//! only in their message-handling state.
//!
//! # Modules
//!
//! - [`generate`] -- Disease occurrence generators for record sources.
//! - [`counts`] -- The per-district daily disease ledger.
//! - [`record_source`] -- Draws occurrences, reports them upstream, and
//!   tracks outbreak alerts learned from its aggregator.
//! - [`district_aggregator`] -- Counts notifications, answers outbreak
//!   queries, relays analyzer alerts, and broadcasts daily counts.
//! - [`outbreak_analyzer`] -- Tallies district counts against a
//!   threshold and raises outbreak alerts.

pub mod counts;
pub mod district_aggregator;
pub mod generate;
pub mod outbreak_analyzer;
pub mod record_source;

pub use counts::DailyDiseaseCount;
pub use district_aggregator::DistrictAggregator;
pub use outbreak_analyzer::{OutbreakAnalyzer, OutbreakTally};
pub use record_source::RecordSource;
