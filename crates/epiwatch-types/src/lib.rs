//! Shared type definitions for the Epiwatch surveillance simulation.
//!
//! This crate is the single source of truth for everything that crosses a
//! process boundary: node identities, role tags, the vector clock carried
//! inside every inter-node exchange, registered node addresses, and the
//! full tagged wire-message vocabulary.
//!
//! # Modules
//!
//! - [`ids`] -- The [`NodeId`] identifier assigned to every participant.
//! - [`roles`] -- The three simulation roles and their wire tags.
//! - [`vector_clock`] -- Per-participant causal counters merged on every
//!   exchange.
//! - [`address`] -- Node addresses (role tag + named endpoint subjects)
//!   and the overseer's address registry.
//! - [`messages`] -- Control, broadcast, and peer message types together
//!   with the protocol's fixed tokens and timing constants.

pub mod address;
pub mod ids;
pub mod messages;
pub mod roles;
pub mod vector_clock;

// Re-export all public types at crate root for convenience.
pub use address::{AddressRegistry, NodeAddress};
pub use ids::NodeId;
pub use messages::{
    Broadcast, CaseReportReply, CaseReportRequest, ControlEnvelope, ControlReply, ControlRequest,
    FanoutMessage,
};
pub use roles::Role;
pub use vector_clock::VectorClock;
