//! Simulation options.

use serde::{Deserialize, Serialize};

use crate::error::{SimError, SimResult};
use crate::integrator::{Algorithm, IntegratorConfig, StepTolerance};

/// When the save hook appends `(t, y)` to the log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SaveOptions {
    /// Save after every accepted step.
    pub every_step: bool,
    /// Explicit save times; each becomes an integrator stop time.
    pub at: Vec<f64>,
    /// Save the initial sample.
    pub start: bool,
    /// Save the final sample.
    pub end: bool,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            every_step: true,
            at: Vec::new(),
            start: true,
            end: true,
        }
    }
}

impl SaveOptions {
    /// Save only at the given times (plus start and end).
    pub fn at(times: impl Into<Vec<f64>>) -> Self {
        Self {
            every_step: false,
            at: times.into(),
            ..Self::default()
        }
    }

    /// Save only the first and last samples.
    pub fn start_and_end() -> Self {
        Self {
            every_step: false,
            ..Self::default()
        }
    }
}

/// Options for simulation runs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimOptions {
    /// Integration method (default: RK4)
    pub algorithm: Algorithm,
    /// Error-controlled step size (embedded methods only)
    pub adaptive: bool,
    /// Step size, or initial step size when adaptive (seconds)
    pub dt: f64,
    /// Discrete update period (seconds)
    pub disc_dt: f64,
    pub t_start: f64,
    /// Final simulation time (seconds); may be infinite for interactive runs
    pub t_end: f64,
    pub save: SaveOptions,
    pub abstol: f64,
    pub reltol: f64,
    /// Smallest step accepted before the run fails
    pub dt_min: f64,
    /// Maximum number of steps (safety limit)
    pub max_steps: u64,
    /// Real-time factor for interactive runs (1.0 = real time)
    pub pace: f64,
}

impl Default for SimOptions {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::default(),
            adaptive: false,
            dt: 1e-2,
            disc_dt: 0.1,
            t_start: 0.0,
            t_end: 10.0,
            save: SaveOptions::default(),
            abstol: 1e-6,
            reltol: 1e-3,
            dt_min: 1e-12,
            max_steps: 10_000_000,
            pace: 1.0,
        }
    }
}

impl SimOptions {
    pub fn validate(&self) -> SimResult<()> {
        if !(self.dt > 0.0 && self.dt.is_finite()) {
            return Err(SimError::InvalidArg {
                what: "dt must be positive",
            });
        }
        if !(self.disc_dt > 0.0 && self.disc_dt.is_finite()) {
            return Err(SimError::InvalidArg {
                what: "disc_dt must be positive",
            });
        }
        if !self.t_start.is_finite() {
            return Err(SimError::InvalidArg {
                what: "t_start must be finite",
            });
        }
        if self.t_end.is_nan() || self.t_end < self.t_start {
            return Err(SimError::InvalidArg {
                what: "t_end must not precede t_start",
            });
        }
        if self.max_steps == 0 {
            return Err(SimError::InvalidArg {
                what: "max_steps must be positive",
            });
        }
        if !(self.abstol > 0.0) || !(self.reltol >= 0.0) {
            return Err(SimError::InvalidArg {
                what: "tolerances must be positive",
            });
        }
        if !(self.dt_min > 0.0 && self.dt_min <= self.dt) {
            return Err(SimError::InvalidArg {
                what: "dt_min must be positive and at most dt",
            });
        }
        if !(self.pace > 0.0) {
            return Err(SimError::InvalidArg {
                what: "pace must be positive",
            });
        }
        if self.adaptive && !self.algorithm.is_embedded() {
            return Err(SimError::InvalidArg {
                what: "adaptive stepping requires an embedded method",
            });
        }
        if self.save.at.iter().any(|t| !t.is_finite()) {
            return Err(SimError::InvalidArg {
                what: "save times must be finite",
            });
        }
        Ok(())
    }

    pub(crate) fn integrator_config(&self) -> IntegratorConfig {
        IntegratorConfig {
            algorithm: self.algorithm,
            adaptive: self.adaptive,
            dt: self.dt,
            dt_min: self.dt_min,
            t_end: self.t_end,
            tol: StepTolerance {
                abstol: self.abstol,
                reltol: self.reltol,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sim_options_defaults() {
        let opts = SimOptions::default();
        assert_eq!(opts.dt, 1e-2);
        assert_eq!(opts.disc_dt, 0.1);
        assert_eq!(opts.algorithm, Algorithm::Rk4);
        assert!(opts.save.every_step);
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn sim_options_invalid() {
        let bad = [
            SimOptions {
                dt: 0.0,
                ..SimOptions::default()
            },
            SimOptions {
                disc_dt: -0.1,
                ..SimOptions::default()
            },
            SimOptions {
                t_start: 5.0,
                t_end: 1.0,
                ..SimOptions::default()
            },
            SimOptions {
                max_steps: 0,
                ..SimOptions::default()
            },
            SimOptions {
                adaptive: true,
                ..SimOptions::default()
            },
            SimOptions {
                pace: 0.0,
                ..SimOptions::default()
            },
            SimOptions {
                save: SaveOptions::at(vec![f64::NAN]),
                ..SimOptions::default()
            },
        ];
        for opts in bad {
            assert!(
                matches!(opts.validate(), Err(SimError::InvalidArg { .. })),
                "{opts:?}"
            );
        }
    }

    #[test]
    fn infinite_end_is_allowed() {
        let opts = SimOptions {
            t_end: f64::INFINITY,
            ..SimOptions::default()
        };
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn partial_config_fills_defaults() {
        let json = r#"{"algorithm":"bogacki_shampine","adaptive":true,"save":{"at":[0.5]}}"#;
        let opts: SimOptions = serde_json::from_str(json).unwrap();
        assert_eq!(opts.algorithm, Algorithm::BogackiShampine);
        assert!(opts.save.start);
        assert_eq!(opts.save.at, vec![0.5]);
        assert_eq!(opts.t_end, 10.0);
        assert!(opts.validate().is_ok());
    }
}
