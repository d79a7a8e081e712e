//! The outbreak analyzer protocol.
//!
//! An outbreak analyzer watches one disease across every district
//! aggregator it subscribes to. Each daily-count broadcast replaces that
//! sender's latest figure in the tally; the running total is recomputed
//! over all known senders, and the first time it reaches the configured
//! threshold within a simulated day the analyzer raises a single
//! outbreak alert. The tally (including the sent flag) is archived and
//! replaced at each day rollover.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use epiwatch_core::clock::SimulationClock;
use epiwatch_types::{FanoutMessage, NodeId, VectorClock};

/// The per-day tally of one watched disease across districts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutbreakTally {
    /// Latest reported count per district aggregator.
    per_sender: BTreeMap<NodeId, u64>,
    /// Sum of the latest counts over all known senders.
    total: u64,
    /// Whether this period's alert has already been broadcast.
    notification_sent: bool,
}

impl OutbreakTally {
    /// A fresh tally with no reports and the sent flag cleared.
    pub const fn new() -> Self {
        Self {
            per_sender: BTreeMap::new(),
            total: 0,
            notification_sent: false,
        }
    }

    /// Replace `sender`'s latest count and recompute the total over all
    /// known senders (not just the one that reported).
    pub fn record(&mut self, sender: &NodeId, count: u64) {
        self.per_sender.insert(sender.clone(), count);
        self.total = self
            .per_sender
            .values()
            .fold(0u64, |sum, &value| sum.saturating_add(value));
    }

    /// The running total over all known senders.
    pub const fn total(&self) -> u64 {
        self.total
    }

    /// Whether this period's alert has already been broadcast.
    pub const fn notification_sent(&self) -> bool {
        self.notification_sent
    }

    /// Latch the sent flag for the rest of the period.
    pub const fn mark_notification_sent(&mut self) {
        self.notification_sent = true;
    }

    /// Number of districts that have reported this period.
    pub fn sender_count(&self) -> usize {
        self.per_sender.len()
    }
}

/// Message-handling state for one outbreak analyzer.
#[derive(Debug)]
pub struct OutbreakAnalyzer {
    /// This node's id.
    node_id: NodeId,
    /// The single disease this analyzer watches.
    disease: String,
    /// Daily total at or above which an alert is raised.
    threshold: u64,
    /// This node's causal history.
    clock: VectorClock,
    /// The tally for the simulated day in progress.
    tally: OutbreakTally,
    /// Archived tallies, one per completed day; drives rollover
    /// detection.
    previous_days: Vec<OutbreakTally>,
}

impl OutbreakAnalyzer {
    /// A fresh analyzer watching `disease` with the given daily
    /// threshold.
    pub const fn new(node_id: NodeId, disease: String, threshold: u64) -> Self {
        Self {
            node_id,
            disease,
            threshold,
            clock: VectorClock::new(),
            tally: OutbreakTally::new(),
            previous_days: Vec::new(),
        }
    }

    /// Absorb one message from a subscribed daily-count channel.
    ///
    /// Returns the outbreak alert to broadcast when this message pushes
    /// the daily total to the threshold for the first time this period.
    pub fn handle_fanout(&mut self, message: &FanoutMessage) -> Option<FanoutMessage> {
        match message {
            FanoutMessage::DailyDiseaseCount {
                district_aggregator_id,
                counts,
                vector_clock,
                ..
            } => {
                self.clock.increment(&self.node_id);
                self.clock.merge(vector_clock);

                let reported = counts.get(&self.disease).copied().unwrap_or(0);
                self.tally.record(district_aggregator_id, reported);
                debug!(
                    node_id = %self.node_id,
                    disease = self.disease.as_str(),
                    from = %district_aggregator_id,
                    reported,
                    total = self.tally.total(),
                    "daily count recorded"
                );

                if self.tally.total() >= self.threshold && !self.tally.notification_sent() {
                    self.tally.mark_notification_sent();
                    self.clock.increment(&self.node_id);
                    warn!(
                        node_id = %self.node_id,
                        disease = self.disease.as_str(),
                        total = self.tally.total(),
                        threshold = self.threshold,
                        "outbreak threshold reached, raising alert"
                    );
                    return Some(FanoutMessage::DiseaseOutbreakAlert {
                        disease: self.disease.clone(),
                        vector_clock: self.clock.snapshot(),
                    });
                }
                None
            }
            FanoutMessage::DiseaseOutbreakAlert { .. } => {
                warn!(
                    node_id = %self.node_id,
                    "unrecognized message kind on daily-count channel, dropping"
                );
                None
            }
        }
    }

    /// Per-tick duties: archive the tally and start fresh at the day
    /// rollover.
    pub fn on_tick(&mut self, sim: &SimulationClock, now: DateTime<Utc>) {
        if sim.rollover_due(now, self.previous_days.len()) {
            let completed = core::mem::replace(&mut self.tally, OutbreakTally::new());
            debug!(
                node_id = %self.node_id,
                day = self.previous_days.len().saturating_add(1),
                total = completed.total(),
                "outbreak tally archived"
            );
            self.previous_days.push(completed);
        }
    }

    /// This node's causal history.
    pub const fn clock(&self) -> &VectorClock {
        &self.clock
    }

    /// The tally for the simulated day in progress.
    pub const fn tally(&self) -> &OutbreakTally {
        &self.tally
    }

    /// Archived tallies, one per completed simulated day.
    pub fn previous_days(&self) -> &[OutbreakTally] {
        &self.previous_days
    }
}
