//! Throttle servo: a PI loop positioning the throttle lever.

use fdm_system::{Args, Component, NodeMut, SystemResult};

use crate::actuator::ThrottleActuator;
use crate::controller::PiController;

/// Composite whose discrete hook feeds the lever position back to the PI
/// loop and its command forward to the lever.
///
/// The commanded lever setting is `controller.reference`.
#[derive(Debug, Clone, PartialEq)]
pub struct ThrottleServo {
    pub actuator: ThrottleActuator,
    pub controller: PiController,
}

impl ThrottleServo {
    pub fn new(actuator: ThrottleActuator, controller: PiController) -> Self {
        Self {
            actuator,
            controller,
        }
    }
}

impl Component for ThrottleServo {
    fn children(&self) -> Vec<(&str, &dyn Component)> {
        vec![
            ("actuator", &self.actuator),
            ("controller", &self.controller),
        ]
    }

    fn f_disc(&self, node: &mut NodeMut<'_>, dt: f64, args: Args<'_>) -> SystemResult<bool> {
        let throttle = node.y()?.get_path_f64("actuator.throttle")?;
        node.child_mut("controller")?
            .u_mut()?
            .set_path_f64("measured", throttle)?;

        let modified = node.f_disc_children(dt, args)?;

        let cmd = node.s()?.get_path_f64("controller.cmd")?;
        node.child_mut("actuator")?.u_mut()?.set_path_f64("cmd", cmd)?;
        Ok(modified)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fdm_system::System;

    fn servo() -> ThrottleServo {
        ThrottleServo::new(
            ThrottleActuator::new(0.2, 5.0).unwrap(),
            PiController::new(2.0, 4.0, 0.0, 1.0)
                .unwrap()
                .with_reference(0.6),
        )
    }

    #[test]
    fn derived_containers_cover_both_children() {
        let sys = System::new(servo()).unwrap();
        assert_eq!(sys.x().len(), 1);
        let u = sys.u().unwrap();
        assert_eq!(u.get_path_f64("controller.reference").unwrap(), 0.6);
        assert_eq!(u.get_path_f64("actuator.cmd").unwrap(), 0.0);
        assert!(sys.s().unwrap().lookup("actuator").is_none());
    }

    #[test]
    fn discrete_hook_routes_signals() {
        let mut sys = System::new(servo()).unwrap();
        sys.f_ode(Args::NONE).unwrap();
        sys.f_disc(0.1, Args::NONE).unwrap();

        let u = sys.u().unwrap();
        assert_eq!(u.get_path_f64("controller.measured").unwrap(), 0.0);
        let cmd = u.get_path_f64("actuator.cmd").unwrap();
        // 2.0 * 0.6 + 4.0 * 0.06 = 1.44, past full power.
        assert_eq!(cmd, 1.0);
        assert_eq!(sys.s().unwrap().get_path_f64("controller.integral").unwrap(), 0.0);
    }
}
