//! Periodic sample schedule for the discrete update hook.
//!
//! The discrete hook runs at a fixed period, independent of and usually
//! coarser than the integrator step. Between samples anything it writes is
//! held (zero-order hold).

use fdm_core::time_eps;
use serde::{Deserialize, Serialize};

use crate::error::{SimError, SimResult};

/// Tracks the next sample instant `origin + k·period`.
///
/// Sample times are computed by multiplication, not accumulation, so they do
/// not drift over long runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodicClock {
    period: f64,
    origin: f64,
    /// Index of the next sample (the first sample is at `origin + period`).
    next: u64,
}

impl PeriodicClock {
    pub fn new(period: f64, origin: f64) -> SimResult<Self> {
        if !(period > 0.0 && period.is_finite()) {
            return Err(SimError::InvalidArg {
                what: "sample period must be positive",
            });
        }
        Ok(Self {
            period,
            origin,
            next: 1,
        })
    }

    pub fn period(&self) -> f64 {
        self.period
    }

    /// Time of the next scheduled sample.
    pub fn next_time(&self) -> f64 {
        self.origin + self.next as f64 * self.period
    }

    /// True if `t` has reached the next sample instant.
    pub fn is_due(&self, t: f64) -> bool {
        let next = self.next_time();
        t >= next - time_eps(next)
    }

    /// Move past every sample instant at or before `t`.
    pub fn advance_past(&mut self, t: f64) {
        while self.is_due(t) {
            self.next += 1;
        }
    }

    pub fn reset(&mut self, origin: f64) {
        self.origin = origin;
        self.next = 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn rejects_bad_period() {
        assert!(PeriodicClock::new(0.0, 0.0).is_err());
        assert!(PeriodicClock::new(f64::NAN, 0.0).is_err());
        assert!(PeriodicClock::new(f64::INFINITY, 0.0).is_err());
    }

    #[test]
    fn fires_ten_times_over_one_second() {
        let mut clock = PeriodicClock::new(0.1, 0.0).unwrap();
        let mut fired = Vec::new();
        let mut t = 0.0;
        // Steps of 0.01 accumulated the naive way, so t drifts off the grid.
        for _ in 0..100 {
            t += 0.01;
            if clock.is_due(t) {
                fired.push(clock.next_time());
                clock.advance_past(t);
            }
        }
        assert_eq!(fired.len(), 10);
        assert!((fired[9] - 1.0).abs() < 1e-12);
        assert!((clock.next_time() - 1.1).abs() < 1e-12);
    }

    #[test]
    fn no_drift_after_many_periods() {
        let mut clock = PeriodicClock::new(0.1, 2.0).unwrap();
        for k in 1..=100_000_u64 {
            let t = 2.0 + k as f64 * 0.1;
            assert!(clock.is_due(t));
            clock.advance_past(t);
        }
        assert_eq!(clock.next_time(), 2.0 + 100_001.0 * 0.1);
    }

    #[test]
    fn reset_restarts_from_new_origin() {
        let mut clock = PeriodicClock::new(0.5, 0.0).unwrap();
        clock.advance_past(1.2);
        assert_eq!(clock.next_time(), 1.5);
        assert!(!clock.is_due(1.2));
        clock.reset(3.0);
        assert_eq!(clock.next_time(), 3.5);
        assert_eq!(clock.period(), 0.5);
    }

    proptest! {
        // Sub-stepping each period `m` times over `n` periods fires exactly
        // `n` samples, whatever the origin.
        #[test]
        fn fires_once_per_period(
            period in 1e-2_f64..1.0,
            n in 1_u64..200,
            m in 1_u64..10,
            origin in -100.0_f64..100.0,
        ) {
            let mut clock = PeriodicClock::new(period, origin).unwrap();
            let h = period / m as f64;
            let mut fired = 0_u64;
            for i in 1..=n * m {
                let t = origin + i as f64 * h;
                if clock.is_due(t) {
                    fired += 1;
                    clock.advance_past(t);
                }
            }
            prop_assert_eq!(fired, n);
        }
    }
}
