//! Throttle lever actuator.
//!
//! Models the servo motor that drives the throttle lever: the lever follows
//! its command with a first-order lag, limited in slew rate, between the idle
//! and full-power stops.

use fdm_system::{Args, Component, NodeMut, Record, StateVector, SystemResult, Value};
use serde::{Deserialize, Serialize};

use crate::error::{ComponentError, ComponentResult};

/// Normalized throttle lever (0 = idle, 1 = full power) driven by `u.cmd`.
///
/// The continuous state and the output are both `throttle`. Lever travel past
/// a stop is undone in the post-step hook.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ThrottleActuator {
    /// Lag time constant [s]
    pub tau: f64,
    /// Maximum lever speed [1/s]
    pub max_slew: f64,
    /// Lever setting at t = 0
    pub throttle0: f64,
}

impl ThrottleActuator {
    pub fn new(tau: f64, max_slew: f64) -> ComponentResult<Self> {
        if !(tau > 0.0) {
            return Err(ComponentError::InvalidArg {
                what: "throttle lag must be positive",
            });
        }
        if !(max_slew > 0.0) {
            return Err(ComponentError::InvalidArg {
                what: "throttle slew limit must be positive",
            });
        }
        Ok(Self {
            tau,
            max_slew,
            throttle0: 0.0,
        })
    }

    pub fn with_throttle(mut self, throttle: f64) -> Self {
        self.throttle0 = throttle.clamp(0.0, 1.0);
        self
    }

    /// Lever rate for the current setting and command.
    pub fn slew(&self, throttle: f64, cmd: f64) -> f64 {
        ((cmd - throttle) / self.tau).clamp(-self.max_slew, self.max_slew)
    }
}

impl Component for ThrottleActuator {
    fn x0(&self) -> Option<StateVector> {
        Some(StateVector::named(&[("throttle", self.throttle0)]))
    }

    fn y0(&self) -> Option<Value> {
        Some(Record::new().with("throttle", self.throttle0).into())
    }

    fn u0(&self) -> Option<Value> {
        Some(Record::new().with("cmd", self.throttle0).into())
    }

    fn params(&self) -> Option<Value> {
        Some(
            Record::new()
                .with("tau", self.tau)
                .with("max_slew", self.max_slew)
                .into(),
        )
    }

    fn f_ode(&self, node: &mut NodeMut<'_>, _args: Args<'_>) -> SystemResult<()> {
        let cmd = node.u()?.get_path_f64("cmd")?;
        let (x, xdot) = node.state_mut()?;
        xdot[0] = self.slew(x[0], cmd);
        let throttle = x[0];
        node.y_mut()?.set_path_f64("throttle", throttle)
    }

    fn f_step(&self, node: &mut NodeMut<'_>, _args: Args<'_>) -> SystemResult<bool> {
        let x = node.x_mut()?;
        let on_stops = x[0].clamp(0.0, 1.0);
        let moved = on_stops != x[0];
        x[0] = on_stops;
        Ok(moved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fdm_system::System;

    #[test]
    fn slew_is_limited() {
        let lever = ThrottleActuator::new(1.0, 0.5).unwrap();
        assert_eq!(lever.slew(0.0, 1.0), 0.5);
        assert_eq!(lever.slew(1.0, 0.0), -0.5);
        assert!((lever.slew(0.5, 0.6) - 0.1).abs() < 1e-12);
    }

    #[test]
    fn rejects_bad_parameters() {
        assert!(ThrottleActuator::new(0.0, 1.0).is_err());
        assert!(ThrottleActuator::new(1.0, -1.0).is_err());
        assert!(ThrottleActuator::new(f64::NAN, 1.0).is_err());
    }

    #[test]
    fn lever_stops_at_full_and_idle() {
        let lever = ThrottleActuator::new(0.1, 10.0).unwrap().with_throttle(0.5);
        let mut sys = System::new(lever).unwrap();

        sys.x_mut()[0] = 1.2;
        assert!(sys.f_step(Args::NONE).unwrap());
        assert_eq!(sys.x(), &[1.0]);

        sys.x_mut()[0] = -0.1;
        assert!(sys.f_step(Args::NONE).unwrap());
        assert_eq!(sys.x(), &[0.0]);

        sys.x_mut()[0] = 0.3;
        assert!(!sys.f_step(Args::NONE).unwrap());
        assert_eq!(sys.x(), &[0.3]);
    }

    #[test]
    fn lever_moves_toward_command() {
        let mut sys = System::new(ThrottleActuator::new(0.5, 10.0).unwrap()).unwrap();
        sys.u_mut().unwrap().set_path_f64("cmd", 1.0).unwrap();
        sys.f_ode(Args::NONE).unwrap();
        assert!((sys.xdot()[0] - 2.0).abs() < 1e-12);
    }
}
