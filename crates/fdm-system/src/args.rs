//! Type-erased extra arguments threaded through the update protocol.

use std::any::{Any, type_name};
use std::fmt;

use crate::error::{SystemError, SystemResult};

/// Extra per-call arguments for `f_ode`/`f_step`/`f_disc`.
///
/// Composite fallbacks forward the same `Args` to every child. A leaf that
/// needs them asks for a concrete type with [`Args::get`], which fails loudly
/// instead of silently skipping the update.
#[derive(Clone, Copy, Default)]
pub struct Args<'a> {
    inner: Option<&'a dyn Any>,
}

impl Args<'static> {
    pub const NONE: Self = Self { inner: None };
}

impl<'a> Args<'a> {
    pub fn new<T: Any>(value: &'a T) -> Self {
        Self { inner: Some(value) }
    }

    pub fn from_any(value: &'a dyn Any) -> Self {
        Self { inner: Some(value) }
    }

    pub fn is_none(&self) -> bool {
        self.inner.is_none()
    }

    /// Borrow the arguments as `T`, reporting `component` on mismatch.
    pub fn get<T: Any>(&self, component: &'static str) -> SystemResult<&'a T> {
        self.try_get::<T>().ok_or(SystemError::ArgsMismatch {
            component,
            expected: type_name::<T>(),
        })
    }

    pub fn try_get<T: Any>(&self) -> Option<&'a T> {
        self.inner.and_then(|a| a.downcast_ref::<T>())
    }
}

impl fmt::Debug for Args<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner {
            Some(_) => f.write_str("Args(..)"),
            None => f.write_str("Args(none)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Environment {
        gravity: f64,
    }

    #[test]
    fn get_matches_type() {
        let env = Environment { gravity: 9.81 };
        let args = Args::new(&env);
        assert_eq!(args.get::<Environment>("test").unwrap().gravity, 9.81);
    }

    #[test]
    fn get_reports_mismatch() {
        let args = Args::new(&1.0_f64);
        let err = args.get::<Environment>("Leaf").unwrap_err();
        assert!(matches!(
            err,
            SystemError::ArgsMismatch {
                component: "Leaf",
                ..
            }
        ));
        assert!(Args::NONE.get::<f64>("Leaf").is_err());
        assert!(Args::NONE.is_none());
    }
}
