//! Error types for simulation runs and attached devices.

use std::sync::PoisonError;

use fdm_results::ResultsError;
use fdm_system::SystemError;
use thiserror::Error;

/// Errors encountered while constructing or running a simulation.
#[derive(Error, Debug)]
pub enum SimError {
    #[error("Invalid argument: {what}")]
    InvalidArg { what: &'static str },

    /// Divergence, non-finite state or step-size underflow.
    #[error("Integration failed at t={t}: {message}")]
    Integration { t: f64, message: String },

    #[error(transparent)]
    System(#[from] SystemError),

    #[error(transparent)]
    Results(#[from] ResultsError),

    #[error("Simulation lock poisoned")]
    LockPoisoned,

    #[error("Frontend error: {message}")]
    Frontend { message: String },

    #[error("Failed to spawn thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Thread '{name}' panicked")]
    ThreadPanicked { name: String },
}

pub type SimResult<T> = Result<T, SimError>;

impl SimError {
    /// True when a component reported a physical/domain violation, as opposed
    /// to a numerical or runtime failure.
    pub fn is_domain(&self) -> bool {
        matches!(self, SimError::System(e) if e.is_domain())
    }
}

impl<T> From<PoisonError<T>> for SimError {
    fn from(_: PoisonError<T>) -> Self {
        SimError::LockPoisoned
    }
}

/// Errors raised by I/O devices and frontends.
///
/// A failing device ends its own loop; it never aborts the simulation, except
/// for the frontend.
#[derive(Error, Debug)]
pub enum IoError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Results(#[from] ResultsError),

    #[error(transparent)]
    System(#[from] SystemError),

    #[error("Simulation lock poisoned")]
    LockPoisoned,

    #[error("Device error: {message}")]
    Device { message: String },
}

pub type IoResult<T> = Result<T, IoError>;

impl<T> From<PoisonError<T>> for IoError {
    fn from(_: PoisonError<T>) -> Self {
        IoError::LockPoisoned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_are_distinguished() {
        let domain = SimError::from(SystemError::Domain {
            component: "Tank",
            message: "negative mass".into(),
        });
        assert!(domain.is_domain());

        let numeric = SimError::Integration {
            t: 1.0,
            message: "non-finite state".into(),
        };
        assert!(!numeric.is_domain());
        assert!(!SimError::from(SystemError::FieldNotFound { path: "x".into() }).is_domain());
    }
}
