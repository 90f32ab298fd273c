//! Reference components for fdm system trees.
//!
//! Leaves declare explicit trait containers and implement the update
//! protocol; composites list children and only override the hooks where
//! they route signals between them.
//!
//! - [`Oscillator`]: harmonic oscillator, continuous state `[pos, vel]`
//! - [`Counter`]: discrete counter in `s`
//! - [`ThrottleActuator`]: slew-limited throttle lever between idle and full power
//! - [`PiController`]: sampled autopilot hold loop with anti-windup, state in `s`
//! - [`ThrottleServo`]: PI loop positioning the throttle lever
//! - [`Harness`]: oscillator plus counter

pub mod actuator;
pub mod controller;
pub mod counter;
pub mod error;
pub mod harness;
pub mod oscillator;
pub mod servo;

pub use actuator::ThrottleActuator;
pub use controller::PiController;
pub use counter::Counter;
pub use error::{ComponentError, ComponentResult};
pub use harness::Harness;
pub use oscillator::Oscillator;
pub use servo::ThrottleServo;
