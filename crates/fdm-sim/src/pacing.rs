//! Wall-clock pacing for interactive runs.

use std::time::{Duration, Instant};

/// Result of waiting for a pacing deadline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncStatus {
    /// The deadline was met (possibly after sleeping).
    Synchronized,
    /// The deadline had already passed by the given lag.
    OutOfSync(Duration),
    /// Unpaced: no deadline was set.
    Unpaced,
}

/// Tracks the wall-clock deadline of the next step.
///
/// Each step pushes the deadline forward by `dt / pace`, measured from the
/// previous deadline rather than from "now", so short overruns are caught up
/// instead of accumulating.
#[derive(Clone, Debug)]
pub struct Pacer {
    deadline: Instant,
}

impl Default for Pacer {
    fn default() -> Self {
        Self::new()
    }
}

impl Pacer {
    pub fn new() -> Self {
        Self {
            deadline: Instant::now(),
        }
    }

    /// Restart from the current instant (after a pause or a pace change).
    pub fn rebase(&mut self) {
        self.deadline = Instant::now();
    }

    /// Advance the deadline for a step of `dt` simulated seconds.
    ///
    /// Returns `None` when unpaced (`pace` infinite).
    pub fn advance(&mut self, dt: f64, pace: f64) -> Option<Instant> {
        if !pace.is_finite() {
            return None;
        }
        let wall = Duration::try_from_secs_f64(dt / pace).unwrap_or(Duration::ZERO);
        self.deadline += wall;
        Some(self.deadline)
    }

    /// Block until `deadline`. Never called with the simulation lock held.
    pub fn wait(deadline: Option<Instant>) -> SyncStatus {
        let Some(deadline) = deadline else {
            return SyncStatus::Unpaced;
        };
        let now = Instant::now();
        if now <= deadline {
            spin_sleep::sleep(deadline.duration_since(now));
            return SyncStatus::Synchronized;
        }
        SyncStatus::OutOfSync(now.duration_since(deadline))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unpaced_never_blocks() {
        let mut pacer = Pacer::new();
        assert_eq!(pacer.advance(1.0, f64::INFINITY), None);
        assert_eq!(Pacer::wait(None), SyncStatus::Unpaced);
    }

    #[test]
    fn paced_wait_tracks_wall_clock() {
        const TOLERANCE: f64 = 0.02; // [s]
        let start = Instant::now();
        let mut pacer = Pacer::new();
        for _ in 0..5 {
            // 0.02 s simulated at double speed: 10 ms wall per step.
            let status = Pacer::wait(pacer.advance(0.02, 2.0));
            assert_ne!(status, SyncStatus::Unpaced);
        }
        let elapsed = start.elapsed().as_secs_f64();
        assert!(elapsed >= 0.05 - 1e-3, "elapsed {elapsed}");
        assert!(elapsed <= 0.05 + TOLERANCE, "elapsed {elapsed}");
    }

    #[test]
    fn late_deadline_reports_lag() {
        let mut pacer = Pacer::new();
        let deadline = pacer.advance(1e-6, 1.0);
        std::thread::sleep(Duration::from_millis(2));
        assert!(matches!(Pacer::wait(deadline), SyncStatus::OutOfSync(_)));
    }
}
