//! Shared run-control and diagnostics record.

use fdm_core::AccumulatingTimer;

/// Run flags and diagnostics, shared with device and frontend threads under
/// the simulation lock.
///
/// Clearing `running` is the only way to stop a run; every loop checks it at
/// each iteration.
#[derive(Debug)]
pub struct SimControl {
    pub running: bool,
    pub paused: bool,
    /// Real-time factor; infinite means unpaced.
    pub pace: f64,
    pub t: f64,
    pub steps: u64,
    /// Size of the last accepted step.
    pub dt: f64,
    /// Wall-clock seconds since the run started.
    pub wall_time: f64,
    /// Wall-clock cost of each step (integration plus hooks).
    pub step_timer: AccumulatingTimer,
    /// Steps that finished after their pacing deadline.
    pub overruns: u64,
    /// Output records replaced before a device consumed them.
    pub dropped_outputs: u64,
    pub discrete_updates: u64,
}

impl SimControl {
    pub fn new(pace: f64, t: f64) -> Self {
        Self {
            running: false,
            paused: false,
            pace,
            t,
            steps: 0,
            dt: 0.0,
            wall_time: 0.0,
            step_timer: AccumulatingTimer::new(),
            overruns: 0,
            dropped_outputs: 0,
            discrete_updates: 0,
        }
    }

    /// Clear diagnostics for a fresh run from time `t`.
    pub fn reset(&mut self, t: f64) {
        self.t = t;
        self.steps = 0;
        self.dt = 0.0;
        self.wall_time = 0.0;
        self.step_timer.reset();
        self.overruns = 0;
        self.dropped_outputs = 0;
        self.discrete_updates = 0;
    }

    /// Simulated seconds per wall-clock second so far.
    pub fn achieved_pace(&self, t_start: f64) -> f64 {
        if self.wall_time > 0.0 {
            (self.t - t_start) / self.wall_time
        } else {
            0.0
        }
    }
}

/// Summary returned when a run ends.
#[derive(Clone, Debug, PartialEq)]
pub struct RunSummary {
    pub t: f64,
    pub steps: u64,
    pub wall_time: f64,
    pub overruns: u64,
    pub dropped_outputs: u64,
    pub discrete_updates: u64,
    /// Mean wall-clock cost of one step (seconds).
    pub mean_step_time: f64,
    /// Slowest step (seconds).
    pub max_step_time: f64,
    /// True if the run ended before reaching `t_end`.
    pub aborted: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_clears_diagnostics() {
        let mut control = SimControl::new(1.0, 0.0);
        control.steps = 10;
        control.t = 2.0;
        control.wall_time = 4.0;
        control.step_timer.record(0.01);
        assert_eq!(control.achieved_pace(0.0), 0.5);

        control.reset(1.0);
        assert_eq!(control.steps, 0);
        assert_eq!(control.t, 1.0);
        assert_eq!(control.step_timer.count(), 0);
        assert_eq!(control.achieved_pace(1.0), 0.0);
    }
}
