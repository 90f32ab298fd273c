//! Sampled PI hold loop, the building block of autopilot modes (airspeed
//! via throttle, altitude via pitch, heading via bank).
//!
//! The loop runs only in the discrete hook and its command is held between
//! samples. The reference and the measured variable come in through `u`; the
//! error integral and the held command are discrete state.

use fdm_system::{Args, Component, NodeMut, Parts, Record, SystemResult, Value};
use serde::{Deserialize, Serialize};

use crate::error::{ComponentError, ComponentResult};

/// PI gains and command authority.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PiController {
    pub kp: f64,
    /// Integral gain [1/s]
    pub ki: f64,
    pub cmd_min: f64,
    pub cmd_max: f64,
    /// Bound on the error integral; `None` leaves it to the command limits.
    pub max_integral: Option<f64>,
    /// Reference held until an input device or parent overrides `u.reference`.
    pub reference: f64,
}

impl PiController {
    pub fn new(kp: f64, ki: f64, cmd_min: f64, cmd_max: f64) -> ComponentResult<Self> {
        if !(kp.is_finite() && ki >= 0.0 && ki.is_finite()) {
            return Err(ComponentError::InvalidArg {
                what: "gains must be finite and ki non-negative",
            });
        }
        if !(cmd_min < cmd_max) {
            return Err(ComponentError::InvalidArg {
                what: "command range is empty",
            });
        }
        Ok(Self {
            kp,
            ki,
            cmd_min,
            cmd_max,
            max_integral: None,
            reference: 0.0,
        })
    }

    pub fn with_max_integral(mut self, limit: f64) -> Self {
        self.max_integral = Some(limit.abs());
        self
    }

    pub fn with_reference(mut self, reference: f64) -> Self {
        self.reference = reference;
        self
    }

    /// One sample of the loop: returns `(integral, cmd)`.
    ///
    /// While the command sits on a limit the integral is frozen
    /// (conditional integration).
    pub fn sample(&self, integral: f64, measured: f64, reference: f64, dt: f64) -> (f64, f64) {
        let error = reference - measured;
        let mut next = integral + error * dt;
        if let Some(limit) = self.max_integral {
            next = next.clamp(-limit, limit);
        }
        let unclamped = self.kp * error + self.ki * next;
        let cmd = unclamped.clamp(self.cmd_min, self.cmd_max);
        if cmd == unclamped {
            (next, cmd)
        } else {
            (integral, cmd)
        }
    }
}

impl Component for PiController {
    fn y0(&self) -> Option<Value> {
        Some(Record::new().with("cmd", 0.0).into())
    }

    fn u0(&self) -> Option<Value> {
        Some(
            Record::new()
                .with("reference", self.reference)
                .with("measured", 0.0)
                .into(),
        )
    }

    fn s0(&self) -> Option<Value> {
        Some(Record::new().with("integral", 0.0).with("cmd", 0.0).into())
    }

    fn params(&self) -> Option<Value> {
        Some(
            Record::new()
                .with("kp", self.kp)
                .with("ki", self.ki)
                .with("cmd_min", self.cmd_min)
                .with("cmd_max", self.cmd_max)
                .into(),
        )
    }

    fn f_ode(&self, node: &mut NodeMut<'_>, _args: Args<'_>) -> SystemResult<()> {
        let cmd = node.s()?.get_path_f64("cmd")?;
        node.y_mut()?.set_path_f64("cmd", cmd)
    }

    fn f_disc(&self, node: &mut NodeMut<'_>, dt: f64, _args: Args<'_>) -> SystemResult<bool> {
        let Parts {
            u: Some(u),
            s: Some(s),
            ..
        } = node.parts_mut()
        else {
            return Err(node.absent("s"));
        };
        let (integral, cmd) = self.sample(
            s.get_path_f64("integral")?,
            u.get_path_f64("measured")?,
            u.get_path_f64("reference")?,
            dt,
        );
        s.set_path_f64("integral", integral)?;
        s.set_path_f64("cmd", cmd)?;
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fdm_system::System;

    #[test]
    fn rejects_bad_parameters() {
        assert!(PiController::new(1.0, -1.0, 0.0, 1.0).is_err());
        assert!(PiController::new(f64::NAN, 1.0, 0.0, 1.0).is_err());
        assert!(PiController::new(1.0, 1.0, 1.0, 1.0).is_err());
    }

    #[test]
    fn proportional_and_integral_action() {
        let pi = PiController::new(2.0, 2.0, -10.0, 10.0).unwrap();
        let (integral, cmd) = pi.sample(0.0, 0.0, 1.0, 0.1);
        assert!((integral - 0.1).abs() < 1e-12);
        assert!((cmd - 2.2).abs() < 1e-12);
    }

    #[test]
    fn integral_frozen_on_command_limit() {
        let pi = PiController::new(10.0, 10.0, 0.0, 1.0).unwrap();
        let (integral, cmd) = pi.sample(0.3, 0.0, 1.0, 0.1);
        assert_eq!(cmd, 1.0);
        assert_eq!(integral, 0.3);
    }

    #[test]
    fn integral_bound_is_respected() {
        let pi = PiController::new(0.1, 1.0, -100.0, 100.0)
            .unwrap()
            .with_max_integral(0.5);
        let (integral, _) = pi.sample(0.45, 0.0, 1.0, 1.0);
        assert_eq!(integral, 0.5);
    }

    #[test]
    fn command_held_between_samples() {
        let pi = PiController::new(1.0, 1.0, -5.0, 5.0)
            .unwrap()
            .with_reference(1.0);
        let mut sys = System::new(pi).unwrap();
        assert!(!sys.has_x());

        sys.f_disc(0.5, Args::NONE).unwrap();
        sys.f_ode(Args::NONE).unwrap();
        let held = sys.y().unwrap().get_path_f64("cmd").unwrap();
        assert!((held - 1.5).abs() < 1e-12);

        // New measurement, no sample: the command does not move.
        sys.u_mut().unwrap().set_path_f64("measured", 1.0).unwrap();
        sys.f_ode(Args::NONE).unwrap();
        assert_eq!(sys.y().unwrap().get_path_f64("cmd").unwrap(), held);
    }
}
