//! The district aggregator protocol.
//!
//! A district aggregator (one per health district) serves the
//! request/reply side of the case-reports link, counts every disease
//! notification into the day's ledger, answers outbreak queries with the
//! set of diseases currently under alert, absorbs alerts published by
//! the outbreak analyzers it subscribes to, and broadcasts its daily
//! counts on a simulated-hour cadence plus once more at each day
//! rollover before archiving the ledger.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use epiwatch_core::clock::{SimulationClock, simulated_hours};
use epiwatch_types::{CaseReportReply, CaseReportRequest, FanoutMessage, NodeId, VectorClock};

use crate::counts::DailyDiseaseCount;

/// Status literal acked for a handled disease notification.
pub const NOTIFICATION_ACK: &str = "received";

/// Message-handling state for one district aggregator.
#[derive(Debug)]
pub struct DistrictAggregator {
    /// This node's id (the key other clocks know it by).
    node_id: NodeId,
    /// Diseases configured for the deployment (seed the daily ledger).
    diseases: Vec<String>,
    /// This node's causal history.
    clock: VectorClock,
    /// The ledger for the simulated day in progress.
    current_day: DailyDiseaseCount,
    /// Archived ledgers, one per completed day; drives rollover
    /// detection.
    previous_days: Vec<DailyDiseaseCount>,
    /// Diseases currently under active alert in this district.
    outbreaks: BTreeSet<String>,
    /// Simulated interval between daily-count broadcasts.
    report_interval: Duration,
    /// Next simulated instant a cadence broadcast is due.
    next_report_at: DateTime<Utc>,
}

impl DistrictAggregator {
    /// A fresh aggregator whose first simulated day starts at
    /// `day_start`.
    pub fn new(
        node_id: NodeId,
        diseases: Vec<String>,
        day_start: DateTime<Utc>,
        send_frequency_hours: f64,
    ) -> Self {
        let report_interval = simulated_hours(send_frequency_hours);
        Self {
            current_day: DailyDiseaseCount::new(&diseases, day_start),
            next_report_at: day_start
                .checked_add_signed(report_interval)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
            node_id,
            diseases,
            clock: VectorClock::new(),
            previous_days: Vec::new(),
            outbreaks: BTreeSet::new(),
            report_interval,
        }
    }

    /// Serve one request on the case-reports link.
    ///
    /// A disease notification bumps this node's clock, merges the
    /// sender's, and counts the occurrence; an outbreak query only
    /// merges and answers -- no counter changes.
    pub fn handle_case_report(&mut self, request: &CaseReportRequest) -> CaseReportReply {
        match request {
            CaseReportRequest::DiseaseNotification {
                record_source_id,
                disease,
                local_timestamp,
                vector_clock,
            } => {
                self.clock.increment(&self.node_id);
                self.clock.merge(vector_clock);
                self.current_day.record(disease);
                debug!(
                    from = %record_source_id,
                    disease = disease.as_str(),
                    occurred_at = %local_timestamp,
                    count = self.current_day.count_for(disease),
                    "disease notification recorded"
                );
                CaseReportReply::DiseaseNotificationReply {
                    status: NOTIFICATION_ACK.to_owned(),
                    vector_clock: self.clock.snapshot(),
                }
            }
            CaseReportRequest::OutbreakQuery {
                record_source_id,
                vector_clock,
            } => {
                self.clock.merge(vector_clock);
                debug!(
                    from = %record_source_id,
                    outbreaks = self.outbreaks.len(),
                    "outbreak query answered"
                );
                CaseReportReply::OutbreakQueryReply {
                    outbreaks: self.outbreaks.clone(),
                    vector_clock: self.clock.snapshot(),
                }
            }
        }
    }

    /// Absorb one message from a subscribed analyzer alert channel.
    pub fn handle_fanout(&mut self, message: &FanoutMessage) {
        match message {
            FanoutMessage::DiseaseOutbreakAlert {
                disease,
                vector_clock,
            } => {
                self.clock.merge(vector_clock);
                self.outbreaks.insert(disease.clone());
                warn!(
                    node_id = %self.node_id,
                    disease = disease.as_str(),
                    "outbreak alert active in district"
                );
            }
            FanoutMessage::DailyDiseaseCount { .. } => {
                warn!(
                    node_id = %self.node_id,
                    "unrecognized message kind on alert channel, dropping"
                );
            }
        }
    }

    /// Per-tick duties: at most one day rollover, then at most one
    /// cadence broadcast. Returns the daily-count messages to publish.
    pub fn on_tick(&mut self, sim: &SimulationClock, now: DateTime<Utc>) -> Vec<FanoutMessage> {
        let mut emissions = Vec::new();
        let simulated_now = sim.simulated_now(now);

        if sim.rollover_due(now, self.previous_days.len()) {
            emissions.push(self.close_out_day(simulated_now));
        }

        if simulated_now >= self.next_report_at {
            self.clock.increment(&self.node_id);
            emissions.push(self.build_report(simulated_now));
            self.next_report_at = simulated_now
                .checked_add_signed(self.report_interval)
                .unwrap_or(DateTime::<Utc>::MAX_UTC);
        }

        emissions
    }

    /// Broadcast the end-of-day count, archive the ledger, and start a
    /// fresh one. The outbreak set resets with the day.
    fn close_out_day(&mut self, simulated_now: DateTime<Utc>) -> FanoutMessage {
        self.clock.increment(&self.node_id);
        self.current_day.stamp(simulated_now, &self.clock);
        let report = self.build_report(simulated_now);

        let completed = core::mem::replace(
            &mut self.current_day,
            DailyDiseaseCount::new(&self.diseases, simulated_now),
        );
        debug!(
            node_id = %self.node_id,
            day = self.previous_days.len().saturating_add(1),
            "daily disease counts archived"
        );
        self.previous_days.push(completed);
        self.outbreaks.clear();
        report
    }

    fn build_report(&self, end_timestamp: DateTime<Utc>) -> FanoutMessage {
        FanoutMessage::DailyDiseaseCount {
            district_aggregator_id: self.node_id.clone(),
            start_timestamp: self.current_day.start_timestamp(),
            end_timestamp,
            counts: self.current_day.counts().clone(),
            vector_clock: self.clock.snapshot(),
        }
    }

    /// This node's causal history.
    pub const fn clock(&self) -> &VectorClock {
        &self.clock
    }

    /// The ledger for the simulated day in progress.
    pub const fn current_day(&self) -> &DailyDiseaseCount {
        &self.current_day
    }

    /// Archived ledgers, one per completed simulated day.
    pub fn previous_days(&self) -> &[DailyDiseaseCount] {
        &self.previous_days
    }

    /// Diseases currently under active alert in this district.
    pub const fn outbreaks(&self) -> &BTreeSet<String> {
        &self.outbreaks
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    fn day_start() -> DateTime<Utc> {
        "2026-03-01T00:00:00Z".parse().unwrap()
    }

    fn aggregator() -> DistrictAggregator {
        DistrictAggregator::new(
            NodeId::new("hds_1"),
            vec!["flu".to_owned(), "measles".to_owned()],
            day_start(),
            2.0,
        )
    }

    fn notification(disease: &str, sender: &str, sender_clock: &VectorClock) -> CaseReportRequest {
        CaseReportRequest::DiseaseNotification {
            record_source_id: NodeId::new(sender),
            disease: disease.to_owned(),
            local_timestamp: day_start(),
            vector_clock: sender_clock.snapshot(),
        }
    }

    #[test]
    fn three_notifications_count_three_and_touch_nothing_else() {
        let mut aggregator = aggregator();
        let mut sender_clock = VectorClock::new();

        for _ in 0..3 {
            sender_clock.increment(&NodeId::new("emr_1"));
            let request = notification("flu", "emr_1", &sender_clock);
            aggregator.handle_case_report(&request);
        }

        assert_eq!(aggregator.current_day().count_for("flu"), 3);
        assert_eq!(aggregator.current_day().count_for("measles"), 0);
    }

    #[test]
    fn notification_reply_reflects_the_exchange_on_both_axes() {
        let mut aggregator = aggregator();
        let own_before = aggregator.clock().count_for(&NodeId::new("hds_1"));

        let mut sender_clock = VectorClock::new();
        sender_clock.increment(&NodeId::new("emr_1"));
        let reply = aggregator.handle_case_report(&notification("flu", "emr_1", &sender_clock));

        // Own counter advanced and the sender's counter is now present.
        assert_eq!(
            aggregator.clock().count_for(&NodeId::new("hds_1")),
            own_before.saturating_add(1)
        );
        assert_eq!(aggregator.clock().count_for(&NodeId::new("emr_1")), 1);

        let CaseReportReply::DiseaseNotificationReply {
            status,
            vector_clock,
        } = reply
        else {
            panic!("notification must be acked with a notification reply");
        };
        assert_eq!(status, NOTIFICATION_ACK);
        assert_eq!(vector_clock.count_for(&NodeId::new("hds_1")), 1);
    }

    #[test]
    fn outbreak_query_changes_no_counters() {
        let mut aggregator = aggregator();
        let mut sender_clock = VectorClock::new();
        sender_clock.increment(&NodeId::new("emr_1"));

        let own_before = aggregator.clock().count_for(&NodeId::new("hds_1"));
        let reply = aggregator.handle_case_report(&CaseReportRequest::OutbreakQuery {
            record_source_id: NodeId::new("emr_1"),
            vector_clock: sender_clock,
        });

        assert_eq!(aggregator.current_day().count_for("flu"), 0);
        assert_eq!(
            aggregator.clock().count_for(&NodeId::new("hds_1")),
            own_before
        );
        assert!(matches!(
            reply,
            CaseReportReply::OutbreakQueryReply { .. }
        ));
    }

    #[test]
    fn analyzer_alert_lands_in_the_outbreak_set() {
        let mut aggregator = aggregator();
        let mut analyzer_clock = VectorClock::new();
        analyzer_clock.increment(&NodeId::new("doa_1"));

        aggregator.handle_fanout(&FanoutMessage::DiseaseOutbreakAlert {
            disease: "flu".to_owned(),
            vector_clock: analyzer_clock,
        });

        assert!(aggregator.outbreaks().contains("flu"));
        assert_eq!(aggregator.clock().count_for(&NodeId::new("doa_1")), 1);

        // The next outbreak query answers with the alert.
        let reply = aggregator.handle_case_report(&CaseReportRequest::OutbreakQuery {
            record_source_id: NodeId::new("emr_1"),
            vector_clock: VectorClock::new(),
        });
        let CaseReportReply::OutbreakQueryReply { outbreaks, .. } = reply else {
            panic!("query must be acked with a query reply");
        };
        assert!(outbreaks.contains("flu"));
    }

    #[test]
    fn cadence_emits_a_report_when_due() {
        let mut aggregator = aggregator();
        let sim = SimulationClock::new(day_start(), 1800.0).unwrap();

        // 2 wall-clock seconds = 1 simulated hour at 1800x; cadence is
        // every 2 simulated hours.
        let early = day_start() + Duration::seconds(2);
        assert!(aggregator.on_tick(&sim, early).is_empty());

        let due = day_start() + Duration::seconds(4);
        let emissions = aggregator.on_tick(&sim, due);
        assert_eq!(emissions.len(), 1);
        assert!(matches!(
            emissions.first(),
            Some(FanoutMessage::DailyDiseaseCount { .. })
        ));

        // Not due again until another 2 simulated hours pass.
        assert!(aggregator.on_tick(&sim, due + Duration::seconds(1)).is_empty());
    }

    #[test]
    fn rollover_archives_resets_and_reports_once() {
        let mut aggregator = aggregator();
        let sim = SimulationClock::new(day_start(), 1800.0).unwrap();

        aggregator.handle_case_report(&notification("flu", "emr_1", &VectorClock::new()));
        aggregator.handle_fanout(&FanoutMessage::DiseaseOutbreakAlert {
            disease: "flu".to_owned(),
            vector_clock: VectorClock::new(),
        });

        // 48 wall-clock seconds = 1 simulated day at 1800x. The tick
        // lands past the boundary: one rollover report plus the cadence
        // report that is also overdue.
        let past_day = day_start() + Duration::seconds(49);
        let emissions = aggregator.on_tick(&sim, past_day);
        assert_eq!(emissions.len(), 2);

        assert_eq!(aggregator.previous_days().len(), 1);
        assert_eq!(
            aggregator.previous_days().first().map(|d| d.count_for("flu")),
            Some(1)
        );
        assert_eq!(aggregator.current_day().count_for("flu"), 0);
        assert!(aggregator.outbreaks().is_empty());

        // Archive caught up: the next tick does not roll over again.
        let next = past_day + Duration::milliseconds(700);
        assert!(!sim.rollover_due(next, aggregator.previous_days().len()));
    }
}
