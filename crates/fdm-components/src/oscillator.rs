//! Undamped harmonic oscillator.

use fdm_system::{Args, Component, NodeMut, Parts, Record, StateVector, SystemResult, Value};
use serde::{Deserialize, Serialize};

use crate::error::{ComponentError, ComponentResult};

/// `ẍ = -ω²x`, with position and velocity as continuous state and outputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Oscillator {
    /// Angular frequency (rad/s)
    pub omega: f64,
    pub pos0: f64,
    pub vel0: f64,
}

impl Default for Oscillator {
    fn default() -> Self {
        Self {
            omega: 1.0,
            pos0: 1.0,
            vel0: 0.0,
        }
    }
}

impl Oscillator {
    pub fn new(omega: f64, pos0: f64, vel0: f64) -> ComponentResult<Self> {
        if !(omega > 0.0 && omega.is_finite()) {
            return Err(ComponentError::InvalidArg {
                what: "omega must be positive",
            });
        }
        if !(pos0.is_finite() && vel0.is_finite()) {
            return Err(ComponentError::InvalidArg {
                what: "initial state must be finite",
            });
        }
        Ok(Self { omega, pos0, vel0 })
    }

    /// Exact position at time `t` (starting from `t = 0`).
    pub fn exact_pos(&self, t: f64) -> f64 {
        self.pos0 * (self.omega * t).cos() + self.vel0 / self.omega * (self.omega * t).sin()
    }
}

impl Component for Oscillator {
    fn x0(&self) -> Option<StateVector> {
        Some(StateVector::named(&[("pos", self.pos0), ("vel", self.vel0)]))
    }

    fn y0(&self) -> Option<Value> {
        Some(Record::new().with("pos", self.pos0).with("vel", self.vel0).into())
    }

    fn params(&self) -> Option<Value> {
        Some(Record::new().with("omega", self.omega).into())
    }

    fn f_ode(&self, node: &mut NodeMut<'_>, _args: Args<'_>) -> SystemResult<()> {
        let Parts {
            x: Some(x),
            xdot: Some(xdot),
            y: Some(y),
            ..
        } = node.parts_mut()
        else {
            return Err(node.absent("x"));
        };
        xdot[0] = x[1];
        xdot[1] = -self.omega * self.omega * x[0];
        y.set_path_f64("pos", x[0])?;
        y.set_path_f64("vel", x[1])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fdm_system::System;

    #[test]
    fn derivative_is_restoring() {
        let mut sys = System::new(Oscillator::new(2.0, 0.5, 1.0).unwrap()).unwrap();
        sys.f_ode(Args::NONE).unwrap();
        assert_eq!(sys.xdot(), &[1.0, -2.0]);
        assert_eq!(sys.y().unwrap().get_path_f64("vel").unwrap(), 1.0);
    }

    #[test]
    fn rejects_bad_frequency() {
        assert!(Oscillator::new(0.0, 1.0, 0.0).is_err());
        assert!(Oscillator::new(1.0, f64::NAN, 0.0).is_err());
    }

    #[test]
    fn exact_solution_matches_initial_state() {
        let osc = Oscillator::new(3.0, 0.2, 0.6).unwrap();
        assert_eq!(osc.exact_pos(0.0), 0.2);
        // Quarter period: position is vel0 / omega.
        let quarter = std::f64::consts::FRAC_PI_2 / 3.0;
        assert!((osc.exact_pos(quarter) - 0.2).abs() < 1e-12);
    }
}
