//! Lightweight wall-clock timing used for run diagnostics.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// A simple timer that measures elapsed time.
pub struct Timer {
    start: Instant,
}

impl Timer {
    /// Create and start a new timer.
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Elapsed time in seconds since `start`.
    pub fn elapsed(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    /// Stop the timer, record into `acc` and return the elapsed seconds.
    pub fn stop_into(self, acc: &AccumulatingTimer) -> f64 {
        let elapsed = self.elapsed();
        acc.record(elapsed);
        elapsed
    }
}

/// Accumulating timer for tracking total time across multiple calls.
///
/// Atomic so that a diagnostics reader on another thread never needs the
/// simulation lock to sample it.
pub struct AccumulatingTimer {
    total_ns: AtomicU64,
    max_ns: AtomicU64,
    count: AtomicU64,
}

impl Default for AccumulatingTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AccumulatingTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccumulatingTimer")
            .field("count", &self.count())
            .field("total_s", &self.total_seconds())
            .field("max_s", &self.max_seconds())
            .finish()
    }
}

impl AccumulatingTimer {
    /// Create a new accumulating timer.
    pub const fn new() -> Self {
        Self {
            total_ns: AtomicU64::new(0),
            max_ns: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    /// Record a timing measurement.
    pub fn record(&self, duration_s: f64) {
        let nanos = (duration_s.max(0.0) * 1e9) as u64;
        self.total_ns.fetch_add(nanos, Ordering::Relaxed);
        self.max_ns.fetch_max(nanos, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    /// Get total time spent (in seconds).
    pub fn total_seconds(&self) -> f64 {
        self.total_ns.load(Ordering::Relaxed) as f64 / 1e9
    }

    /// Longest single measurement (in seconds).
    pub fn max_seconds(&self) -> f64 {
        self.max_ns.load(Ordering::Relaxed) as f64 / 1e9
    }

    /// Get number of calls.
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Get average time per call (in seconds).
    pub fn average_seconds(&self) -> f64 {
        let count = self.count();
        if count > 0 {
            self.total_seconds() / count as f64
        } else {
            0.0
        }
    }

    /// Reset the timer.
    pub fn reset(&self) {
        self.total_ns.store(0, Ordering::Relaxed);
        self.max_ns.store(0, Ordering::Relaxed);
        self.count.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulating_timer_tracks_average_and_max() {
        let acc = AccumulatingTimer::new();
        assert_eq!(acc.average_seconds(), 0.0);
        acc.record(0.002);
        acc.record(0.004);
        assert_eq!(acc.count(), 2);
        assert!((acc.total_seconds() - 0.006).abs() < 1e-9);
        assert!((acc.average_seconds() - 0.003).abs() < 1e-9);
        assert!((acc.max_seconds() - 0.004).abs() < 1e-9);
        acc.reset();
        assert_eq!(acc.count(), 0);
        assert_eq!(acc.max_seconds(), 0.0);
    }

    #[test]
    fn timer_records_into_accumulator() {
        let acc = AccumulatingTimer::new();
        let timer = Timer::start();
        let elapsed = timer.stop_into(&acc);
        assert!(elapsed >= 0.0);
        assert_eq!(acc.count(), 1);
    }
}
