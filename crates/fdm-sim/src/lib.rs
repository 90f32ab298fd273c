//! Simulation runtime for fdm system trees.
//!
//! Provides:
//! - Explicit ODE integrators (RK4, Heun, forward Euler, Bogacki-Shampine 3(2))
//! - The [`Simulation`] driver with post-step, discrete and save hooks
//! - Real-time pacing and a shared [`SimControl`] record
//! - Threaded input/output devices and an interactive frontend contract

pub mod control;
pub mod devices;
pub mod error;
pub mod integrator;
pub mod io;
pub mod options;
pub mod pacing;
pub mod schedule;
pub mod sim;

// Internal modules
mod event;

pub use control::{RunSummary, SimControl};
pub use devices::{ConsoleFrontend, JsonlOutput, ScriptedInput};
pub use error::{IoError, IoResult, SimError, SimResult};
pub use event::StartEvent;
pub use integrator::{
    Algorithm, BogackiShampine, ForwardEuler, Heun, Integrator, IntegratorConfig, OdeIntegrator,
    OdeRhs, Rk4, StepInfo, StepTolerance,
};
pub use io::{
    Attachment, Attachments, Frontend, Input, InputDevice, InputMapping, IoDevice, Output,
    OutputDevice, OutputRecord,
};
pub use options::{SaveOptions, SimOptions};
pub use pacing::{Pacer, SyncStatus};
pub use schedule::PeriodicClock;
pub use sim::{Callback, ReinitFn, SimHandle, Simulation};
