//! The per-district daily disease ledger.
//!
//! A district aggregator owns one [`DailyDiseaseCount`] for the simulated
//! day in progress. Every disease notification bumps one counter; at the
//! day rollover the record is stamped with its end timestamp and the
//! aggregator's clock snapshot, appended to the archive, and replaced
//! with a fresh all-zero ledger. The archive length is what drives
//! rollover detection, so exactly one record is archived per completed
//! day.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use epiwatch_types::VectorClock;

/// Disease occurrence counts for one simulated day in one district.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyDiseaseCount {
    /// Simulated timestamp at which this day's counting began.
    start_timestamp: DateTime<Utc>,
    /// Simulated timestamp of the latest update (stamped at archive).
    end_timestamp: DateTime<Utc>,
    /// Occurrences per disease. Every configured disease is present from
    /// the start so a zero count is visible, not missing.
    counts: BTreeMap<String, u64>,
    /// The aggregator's clock snapshot, stamped at archive.
    clock_snapshot: VectorClock,
}

impl DailyDiseaseCount {
    /// A fresh all-zero ledger for a day starting at `start` (simulated).
    pub fn new(diseases: &[String], start: DateTime<Utc>) -> Self {
        Self {
            start_timestamp: start,
            end_timestamp: start,
            counts: diseases.iter().map(|d| (d.clone(), 0)).collect(),
            clock_snapshot: VectorClock::new(),
        }
    }

    /// Count one occurrence of `disease`.
    ///
    /// Diseases outside the configured list still count; the notification
    /// already happened, dropping it would lose surveillance data.
    pub fn record(&mut self, disease: &str) {
        let count = self.counts.entry(disease.to_owned()).or_insert(0);
        *count = count.saturating_add(1);
    }

    /// The count recorded for `disease` today (0 if never seen).
    pub fn count_for(&self, disease: &str) -> u64 {
        self.counts.get(disease).copied().unwrap_or(0)
    }

    /// The full per-disease count map.
    pub const fn counts(&self) -> &BTreeMap<String, u64> {
        &self.counts
    }

    /// Simulated timestamp at which this day's counting began.
    pub const fn start_timestamp(&self) -> DateTime<Utc> {
        self.start_timestamp
    }

    /// Simulated timestamp of the latest stamp.
    pub const fn end_timestamp(&self) -> DateTime<Utc> {
        self.end_timestamp
    }

    /// Stamp the ledger with its closing simulated timestamp and the
    /// owning aggregator's clock snapshot. Called just before archiving.
    pub fn stamp(&mut self, end: DateTime<Utc>, clock: &VectorClock) {
        self.end_timestamp = end;
        self.clock_snapshot = clock.snapshot();
    }

    /// The clock snapshot recorded at stamp time.
    pub const fn clock_snapshot(&self) -> &VectorClock {
        &self.clock_snapshot
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use epiwatch_types::NodeId;

    fn start() -> DateTime<Utc> {
        "2026-03-01T00:00:00Z".parse().unwrap()
    }

    #[test]
    fn starts_with_zero_for_every_configured_disease() {
        let ledger = DailyDiseaseCount::new(
            &["measles".to_owned(), "influenza".to_owned()],
            start(),
        );
        assert_eq!(ledger.count_for("measles"), 0);
        assert_eq!(ledger.count_for("influenza"), 0);
        assert_eq!(ledger.counts().len(), 2);
    }

    #[test]
    fn record_increments_only_the_named_disease() {
        let mut ledger = DailyDiseaseCount::new(
            &["measles".to_owned(), "influenza".to_owned()],
            start(),
        );
        ledger.record("measles");
        ledger.record("measles");
        ledger.record("measles");

        assert_eq!(ledger.count_for("measles"), 3);
        assert_eq!(ledger.count_for("influenza"), 0);
    }

    #[test]
    fn unconfigured_disease_is_still_counted() {
        let mut ledger = DailyDiseaseCount::new(&["measles".to_owned()], start());
        ledger.record("cholera");
        assert_eq!(ledger.count_for("cholera"), 1);
    }

    #[test]
    fn stamp_records_end_and_clock() {
        let mut ledger = DailyDiseaseCount::new(&["measles".to_owned()], start());
        let mut clock = VectorClock::new();
        clock.increment(&NodeId::new("hds_1"));

        let end = start() + chrono::Duration::hours(24);
        ledger.stamp(end, &clock);

        assert_eq!(ledger.end_timestamp(), end);
        assert_eq!(ledger.clock_snapshot().count_for(&NodeId::new("hds_1")), 1);
    }
}
