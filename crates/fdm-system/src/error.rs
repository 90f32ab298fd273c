//! System construction and update-protocol errors.

use thiserror::Error;

pub type SystemResult<T> = Result<T, SystemError>;

/// Errors raised while building a system tree or driving its update protocol.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SystemError {
    /// A leaf with continuous state was asked for `f_ode` but never provided one.
    #[error("{component} at '{path}' has continuous state but does not implement {op}")]
    Unimplemented {
        component: &'static str,
        path: String,
        op: &'static str,
    },

    /// Extra update arguments were missing or of an unexpected type.
    #[error("{component} expected update arguments of type {expected}")]
    ArgsMismatch {
        component: &'static str,
        expected: &'static str,
    },

    #[error("Shape mismatch for {what}: expected {expected}, found {found}")]
    ShapeMismatch {
        what: String,
        expected: String,
        found: String,
    },

    #[error("No field or subsystem at '{path}'")]
    FieldNotFound { path: String },

    #[error("Duplicate child '{name}' under '{path}'")]
    DuplicateChild { path: String, name: String },

    #[error("Component type mismatch: expected {expected}, found {found}")]
    ComponentType {
        expected: &'static str,
        found: &'static str,
    },

    /// A physical or domain constraint was violated inside a component.
    ///
    /// Kept distinct from numerical failures so a harness can decide whether
    /// to log and continue or abort.
    #[error("Domain violation in {component}: {message}")]
    Domain {
        component: &'static str,
        message: String,
    },

    #[error("Non-finite value for {what}: {value}")]
    NonFinite { what: &'static str, value: f64 },

    #[error(transparent)]
    Core(#[from] fdm_core::CoreError),
}

impl SystemError {
    /// Convenience constructor for shape errors.
    pub fn shape(
        what: impl Into<String>,
        expected: impl Into<String>,
        found: impl Into<String>,
    ) -> Self {
        SystemError::ShapeMismatch {
            what: what.into(),
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// True for physical/domain violations raised by components.
    pub fn is_domain(&self) -> bool {
        matches!(self, SystemError::Domain { .. })
    }
}
