//! The record source protocol.
//!
//! A record source models one facility's patient records. Each tick it
//! draws an occurrence per configured disease; every occurrence becomes
//! a blocking disease-notification request to its single district
//! aggregator, whose reply clock is merged back in. On a simulated-hour
//! cadence it also queries the aggregator for the district's outbreak
//! set and alert-logs any disease it had not yet seen under alert. The
//! known-outbreak set is archived and reset at each day rollover.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use tracing::{debug, warn};

use epiwatch_core::clock::{SimulationClock, simulated_hours};
use epiwatch_core::config::GenerationModel;
use epiwatch_types::{CaseReportReply, CaseReportRequest, NodeId, VectorClock};

use crate::generate;

/// Message-handling state for one record source.
#[derive(Debug)]
pub struct RecordSource {
    /// This node's id.
    node_id: NodeId,
    /// Diseases this source draws occurrences for.
    diseases: Vec<String>,
    /// The configured occurrence generator.
    generation: GenerationModel,
    /// This node's causal history.
    clock: VectorClock,
    /// Simulated interval between outbreak queries.
    query_interval: Duration,
    /// Next simulated instant an outbreak query is due.
    next_query_at: DateTime<Utc>,
    /// Diseases this source knows to be under alert.
    known_outbreaks: BTreeSet<String>,
    /// Archived outbreak sets, one per completed day; drives rollover
    /// detection.
    previous_days: Vec<BTreeSet<String>>,
}

impl RecordSource {
    /// A fresh record source whose first simulated day starts at
    /// `day_start`.
    pub fn new(
        node_id: NodeId,
        diseases: Vec<String>,
        generation: GenerationModel,
        day_start: DateTime<Utc>,
        query_frequency_hours: f64,
    ) -> Self {
        let query_interval = simulated_hours(query_frequency_hours);
        Self {
            next_query_at: day_start
                .checked_add_signed(query_interval)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
            node_id,
            diseases,
            generation,
            clock: VectorClock::new(),
            query_interval,
            known_outbreaks: BTreeSet::new(),
            previous_days: Vec::new(),
        }
    }

    /// Draw this tick's occurrences: one independent decision per
    /// configured disease at the wall-clock instant `now`.
    pub fn draw_occurrences(&self, now: DateTime<Utc>, rng: &mut impl Rng) -> Vec<String> {
        self.diseases
            .iter()
            .filter(|_| generate::draw(&self.generation, now, rng))
            .cloned()
            .collect()
    }

    /// Build the notification for one occurrence. Bumps this node's
    /// clock; the caller sends the request and blocks for the reply.
    pub fn build_notification(
        &mut self,
        disease: &str,
        simulated_now: DateTime<Utc>,
    ) -> CaseReportRequest {
        self.clock.increment(&self.node_id);
        debug!(
            node_id = %self.node_id,
            disease,
            occurred_at = %simulated_now,
            "disease occurrence drawn"
        );
        CaseReportRequest::DiseaseNotification {
            record_source_id: self.node_id.clone(),
            disease: disease.to_owned(),
            local_timestamp: simulated_now,
            vector_clock: self.clock.snapshot(),
        }
    }

    /// Whether the outbreak-query cadence has come due.
    pub fn query_due(&self, simulated_now: DateTime<Utc>) -> bool {
        simulated_now >= self.next_query_at
    }

    /// Build the outbreak query and advance the cadence. No clock bump:
    /// a query creates no local event.
    pub fn build_outbreak_query(&mut self, simulated_now: DateTime<Utc>) -> CaseReportRequest {
        self.next_query_at = simulated_now
            .checked_add_signed(self.query_interval)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        CaseReportRequest::OutbreakQuery {
            record_source_id: self.node_id.clone(),
            vector_clock: self.clock.snapshot(),
        }
    }

    /// Absorb the aggregator's reply to either request kind.
    ///
    /// Returns the diseases newly learned to be under alert (only ever
    /// non-empty for an outbreak-query reply); the caller alert-logs
    /// them. A reply of the wrong kind is a protocol violation: warned
    /// and dropped without merging.
    pub fn absorb_reply(&mut self, reply: &CaseReportReply) -> Vec<String> {
        match reply {
            CaseReportReply::DiseaseNotificationReply {
                status,
                vector_clock,
            } => {
                self.clock.merge(vector_clock);
                debug!(node_id = %self.node_id, status = status.as_str(), "notification acked");
                Vec::new()
            }
            CaseReportReply::OutbreakQueryReply {
                outbreaks,
                vector_clock,
            } => {
                self.clock.merge(vector_clock);
                let newly_learned: Vec<String> = outbreaks
                    .iter()
                    .filter(|disease| !self.known_outbreaks.contains(*disease))
                    .cloned()
                    .collect();
                for disease in &newly_learned {
                    self.known_outbreaks.insert(disease.clone());
                    warn!(
                        node_id = %self.node_id,
                        disease = disease.as_str(),
                        "outbreak alert learned from district"
                    );
                }
                newly_learned
            }
        }
    }

    /// Per-tick duties: archive the outbreak set and start fresh at the
    /// day rollover.
    pub fn on_tick(&mut self, sim: &SimulationClock, now: DateTime<Utc>) {
        if sim.rollover_due(now, self.previous_days.len()) {
            let completed = core::mem::take(&mut self.known_outbreaks);
            debug!(
                node_id = %self.node_id,
                day = self.previous_days.len().saturating_add(1),
                outbreaks = completed.len(),
                "outbreak set archived"
            );
            self.previous_days.push(completed);
        }
    }

    /// This node's causal history.
    pub const fn clock(&self) -> &VectorClock {
        &self.clock
    }

    /// Diseases this source currently knows to be under alert.
    pub const fn known_outbreaks(&self) -> &BTreeSet<String> {
        &self.known_outbreaks
    }

    /// Archived outbreak sets, one per completed simulated day.
    pub fn previous_days(&self) -> &[BTreeSet<String>] {
        &self.previous_days
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    fn day_start() -> DateTime<Utc> {
        "2026-03-01T00:00:00Z".parse().unwrap()
    }

    fn source(probability: f64) -> RecordSource {
        RecordSource::new(
            NodeId::new("emr_1"),
            vec!["flu".to_owned(), "measles".to_owned()],
            GenerationModel::Random { probability },
            day_start(),
            1.0,
        )
    }

    #[test]
    fn certain_probability_draws_every_disease() {
        let source = source(1.0);
        let mut rng = rand::rng();
        let drawn = source.draw_occurrences(Utc::now(), &mut rng);
        assert_eq!(drawn, vec!["flu".to_owned(), "measles".to_owned()]);
    }

    #[test]
    fn zero_probability_draws_nothing() {
        let source = source(0.0);
        let mut rng = rand::rng();
        assert!(source.draw_occurrences(Utc::now(), &mut rng).is_empty());
    }

    #[test]
    fn notification_bumps_own_clock_and_reply_merges_back() {
        let mut source = source(1.0);
        let request = source.build_notification("flu", day_start());

        assert_eq!(source.clock().count_for(&NodeId::new("emr_1")), 1);
        let CaseReportRequest::DiseaseNotification { vector_clock, .. } = request else {
            panic!("build_notification must produce a notification");
        };
        assert_eq!(vector_clock.count_for(&NodeId::new("emr_1")), 1);

        let mut aggregator_clock = VectorClock::new();
        aggregator_clock.increment(&NodeId::new("hds_1"));
        let learned = source.absorb_reply(&CaseReportReply::DiseaseNotificationReply {
            status: "received".to_owned(),
            vector_clock: aggregator_clock,
        });

        assert!(learned.is_empty());
        assert_eq!(source.clock().count_for(&NodeId::new("hds_1")), 1);
    }

    #[test]
    fn query_cadence_follows_simulated_hours() {
        let mut source = source(0.0);

        // Cadence is one simulated hour.
        assert!(!source.query_due(day_start() + Duration::minutes(30)));
        assert!(source.query_due(day_start() + Duration::hours(1)));

        let queried_at = day_start() + Duration::hours(1);
        let request = source.build_outbreak_query(queried_at);
        assert!(matches!(request, CaseReportRequest::OutbreakQuery { .. }));

        // Advanced: not due again until an hour after the query fired.
        assert!(!source.query_due(queried_at + Duration::minutes(59)));
        assert!(source.query_due(queried_at + Duration::hours(1)));
    }

    #[test]
    fn query_reply_reports_only_newly_learned_diseases() {
        let mut source = source(0.0);
        let mut outbreaks = BTreeSet::new();
        outbreaks.insert("flu".to_owned());

        let first = source.absorb_reply(&CaseReportReply::OutbreakQueryReply {
            outbreaks: outbreaks.clone(),
            vector_clock: VectorClock::new(),
        });
        assert_eq!(first, vec!["flu".to_owned()]);
        assert!(source.known_outbreaks().contains("flu"));

        // The same alert a second time is old news.
        outbreaks.insert("measles".to_owned());
        let second = source.absorb_reply(&CaseReportReply::OutbreakQueryReply {
            outbreaks,
            vector_clock: VectorClock::new(),
        });
        assert_eq!(second, vec!["measles".to_owned()]);
    }

    #[test]
    fn rollover_archives_and_resets_the_outbreak_set() {
        let mut source = source(0.0);
        let sim = SimulationClock::new(day_start(), 1800.0).unwrap();

        let mut outbreaks = BTreeSet::new();
        outbreaks.insert("flu".to_owned());
        source.absorb_reply(&CaseReportReply::OutbreakQueryReply {
            outbreaks,
            vector_clock: VectorClock::new(),
        });

        // 48 wall-clock seconds = one simulated day at 1800x.
        source.on_tick(&sim, day_start() + Duration::seconds(49));

        assert!(source.known_outbreaks().is_empty());
        assert_eq!(source.previous_days().len(), 1);
        assert!(
            source
                .previous_days()
                .first()
                .is_some_and(|day| day.contains("flu"))
        );
    }
}
