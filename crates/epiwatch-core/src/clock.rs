//! Wall-clock to simulated-time scaling.
//!
//! The clock records the wall-clock instant the run phase started and a
//! configured scaling factor. Elapsed simulated time is the scaled
//! wall-clock elapsed time, and the simulated "now" is the start instant
//! plus that scaled elapsed time.
//!
//! # Day rollover
//!
//! A simulated-day boundary is NOT derived from calendar math. A node
//! detects a rollover when the count of whole elapsed simulated days
//! exceeds the number of day records it has already archived. The
//! surrounding protocol (alert-sent flags, count resets) assumes at most
//! one rollover fires per poll iteration, and every role archives exactly
//! one record per completed day, so rollover detection stays tied to
//! archive length by design.

use chrono::{DateTime, Duration, Utc};

/// Errors that can occur when constructing a simulation clock.
#[derive(Debug, thiserror::Error)]
pub enum ClockError {
    /// The scaling factor is unusable (zero, negative, or non-finite).
    #[error("invalid time scaling factor: {reason}")]
    InvalidScalingFactor {
        /// Explanation of what is wrong with the factor.
        reason: String,
    },
}

/// Converts wall-clock elapsed time into scaled simulated time.
///
/// Owned by one node (or the overseer) and never shared; all methods
/// take the current wall-clock instant as an argument so behavior is a
/// pure function of its inputs.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationClock {
    /// Wall-clock instant recorded when the run phase started.
    start: DateTime<Utc>,
    /// Multiplier applied to wall-clock elapsed time.
    time_scaling_factor: f64,
}

impl SimulationClock {
    /// Create a clock that starts counting at `start`.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::InvalidScalingFactor`] unless the factor is
    /// finite and strictly positive.
    pub fn new(start: DateTime<Utc>, time_scaling_factor: f64) -> Result<Self, ClockError> {
        if !time_scaling_factor.is_finite() || time_scaling_factor <= 0.0 {
            return Err(ClockError::InvalidScalingFactor {
                reason: format!("must be finite and positive, got {time_scaling_factor}"),
            });
        }
        Ok(Self {
            start,
            time_scaling_factor,
        })
    }

    /// The recorded run-start instant.
    pub const fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// Scaled elapsed time: `(now - start) * time_scaling_factor`.
    pub fn elapsed(&self, now: DateTime<Utc>) -> Duration {
        let wall_ms = now.signed_duration_since(self.start).num_milliseconds();
        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
        let scaled_ms = (wall_ms as f64 * self.time_scaling_factor) as i64;
        Duration::milliseconds(scaled_ms)
    }

    /// The simulated "now": run start plus scaled elapsed time.
    pub fn simulated_now(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.start
            .checked_add_signed(self.elapsed(now))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Whole simulated days elapsed since the run started.
    pub fn elapsed_days(&self, now: DateTime<Utc>) -> i64 {
        self.elapsed(now).num_days()
    }

    /// Whether a simulated-day rollover is due, given how many completed
    /// days this node has archived so far.
    ///
    /// Fires when elapsed days exceed the archive length; archiving one
    /// record per rollover keeps the two in lockstep.
    pub fn rollover_due(&self, now: DateTime<Utc>, archived_days: usize) -> bool {
        let archived = i64::try_from(archived_days).unwrap_or(i64::MAX);
        self.elapsed_days(now) > archived
    }
}

/// Convert a configured simulated-hours frequency into a [`Duration`].
///
/// Used for the aggregator's count-send cadence and the record source's
/// outbreak-query cadence.
pub fn simulated_hours(hours: f64) -> Duration {
    #[allow(clippy::cast_possible_truncation)]
    let ms = (hours * 3_600_000.0) as i64;
    Duration::milliseconds(ms)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn start() -> DateTime<Utc> {
        "2026-03-01T00:00:00Z".parse().unwrap()
    }

    #[test]
    fn rejects_bad_scaling_factors() {
        assert!(SimulationClock::new(start(), 0.0).is_err());
        assert!(SimulationClock::new(start(), -1.0).is_err());
        assert!(SimulationClock::new(start(), f64::NAN).is_err());
        assert!(SimulationClock::new(start(), f64::INFINITY).is_err());
        assert!(SimulationClock::new(start(), 1800.0).is_ok());
    }

    #[test]
    fn elapsed_scales_wall_time() {
        // 1800x: one wall-clock minute is 30 simulated hours.
        let clock = SimulationClock::new(start(), 1800.0).unwrap();
        let now = start() + Duration::seconds(60);
        assert_eq!(clock.elapsed(now), Duration::hours(30));
    }

    #[test]
    fn simulated_now_is_start_plus_scaled_elapsed() {
        let clock = SimulationClock::new(start(), 1800.0).unwrap();
        let now = start() + Duration::seconds(2);
        assert_eq!(clock.simulated_now(now), start() + Duration::hours(1));
    }

    #[test]
    fn elapsed_days_counts_whole_simulated_days() {
        // 1800x: 48 wall-clock seconds is one simulated day.
        let clock = SimulationClock::new(start(), 1800.0).unwrap();
        assert_eq!(clock.elapsed_days(start() + Duration::seconds(47)), 0);
        assert_eq!(clock.elapsed_days(start() + Duration::seconds(48)), 1);
        assert_eq!(clock.elapsed_days(start() + Duration::seconds(100)), 2);
    }

    #[test]
    fn rollover_tracks_archive_length_not_calendar() {
        let clock = SimulationClock::new(start(), 1800.0).unwrap();
        let two_days_in = start() + Duration::seconds(100);

        // Two days elapsed, nothing archived yet: a rollover is due, and
        // stays due until the archive catches up one record at a time.
        assert!(clock.rollover_due(two_days_in, 0));
        assert!(clock.rollover_due(two_days_in, 1));
        assert!(!clock.rollover_due(two_days_in, 2));
    }

    #[test]
    fn no_rollover_before_first_day_completes() {
        let clock = SimulationClock::new(start(), 1800.0).unwrap();
        assert!(!clock.rollover_due(start() + Duration::seconds(47), 0));
    }

    #[test]
    fn simulated_hours_converts_fractions() {
        assert_eq!(simulated_hours(2.0), Duration::hours(2));
        assert_eq!(simulated_hours(0.5), Duration::minutes(30));
    }
}
