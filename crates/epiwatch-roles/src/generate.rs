//! Disease occurrence generators.
//!
//! A record source draws one occurrence per configured disease per tick.
//! The draw itself is a uniform roll in `[0, 1)` compared against a
//! probability that comes from one of two models: a fixed Bernoulli
//! probability, or a probability that oscillates sinusoidally over the
//! wall-clock second between configured bounds.
//!
//! The roll is injected so every decision is reproducible in tests; the
//! node binary supplies `rand` rolls at runtime.

use chrono::{DateTime, Timelike, Utc};
use rand::Rng;

use epiwatch_core::config::GenerationModel;

/// Whether a roll in `[0, 1)` counts as an occurrence at `probability`.
///
/// `probability` is validated to `[0, 1]` at configuration time, so 0
/// never fires and 1 always does.
pub fn occurs(probability: f64, roll: f64) -> bool {
    roll < probability
}

/// The sinusoidal probability at a given fraction of the wall-clock
/// second: `min + (max - min) * (sin(2π·fraction) + 1) / 2`.
pub fn sine_probability(min: f64, max: f64, second_fraction: f64) -> f64 {
    let phase = (core::f64::consts::TAU * second_fraction).sin();
    (max - min).mul_add((phase + 1.0) / 2.0, min)
}

/// The effective occurrence probability of `model` at wall-clock `now`.
pub fn probability_at(model: &GenerationModel, now: DateTime<Utc>) -> f64 {
    match *model {
        GenerationModel::Random { probability } => probability,
        GenerationModel::Sine {
            min_probability,
            max_probability,
        } => {
            let fraction = f64::from(now.nanosecond()) / 1_000_000_000.0;
            sine_probability(min_probability, max_probability, fraction)
        }
    }
}

/// Draw one occurrence decision from `model` at wall-clock `now`.
pub fn draw(model: &GenerationModel, now: DateTime<Utc>, rng: &mut impl Rng) -> bool {
    occurs(probability_at(model, now), rng.random::<f64>())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn probability_zero_never_occurs() {
        assert!(!occurs(0.0, 0.0));
        assert!(!occurs(0.0, 0.999));
    }

    #[test]
    fn probability_one_always_occurs() {
        assert!(occurs(1.0, 0.0));
        assert!(occurs(1.0, 0.999_999));
    }

    #[test]
    fn roll_is_compared_strictly() {
        assert!(occurs(0.5, 0.499));
        assert!(!occurs(0.5, 0.5));
    }

    #[test]
    fn sine_sweeps_between_the_bounds() {
        // fraction 0 sits at the midpoint, 0.25 peaks, 0.75 bottoms out.
        let min = 0.2;
        let max = 0.8;
        assert!((sine_probability(min, max, 0.0) - 0.5).abs() < 1e-9);
        assert!((sine_probability(min, max, 0.25) - max).abs() < 1e-9);
        assert!((sine_probability(min, max, 0.75) - min).abs() < 1e-9);
    }

    #[test]
    fn sine_stays_within_bounds_everywhere() {
        let min = 0.1;
        let max = 0.9;
        for step in 0..100 {
            let fraction = f64::from(step) / 100.0;
            let p = sine_probability(min, max, fraction);
            assert!((min..=max).contains(&p), "p = {p} at fraction {fraction}");
        }
    }

    #[test]
    fn fixed_model_ignores_the_wall_clock() {
        let model = GenerationModel::Random { probability: 0.3 };
        let now = Utc::now();
        assert!((probability_at(&model, now) - 0.3).abs() < 1e-12);
    }
}
