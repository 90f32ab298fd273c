//! Error types for component construction.

use thiserror::Error;

/// Result type for component construction.
pub type ComponentResult<T> = Result<T, ComponentError>;

/// Errors raised when a component is configured with invalid parameters.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ComponentError {
    #[error("Invalid argument: {what}")]
    InvalidArg { what: &'static str },
}
