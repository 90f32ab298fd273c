use crate::{CoreError, CoreResult};

/// Floating point type used throughout the runtime
pub type Real = f64;

/// Absolute + relative tolerance pair
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Tolerances {
    pub abs: Real,
    pub rel: Real,
}

impl Default for Tolerances {
    fn default() -> Self {
        Self {
            abs: 1e-12,
            rel: 1e-9,
        }
    }
}

pub fn nearly_equal(a: Real, b: Real, tol: Tolerances) -> bool {
    let diff = (a - b).abs();
    if diff <= tol.abs {
        return true;
    }
    diff <= tol.rel * a.abs().max(b.abs())
}

/// Check every element of a state slice, reporting the first offender.
pub fn ensure_all_finite(values: &[Real], what: &'static str) -> CoreResult<()> {
    match values.iter().find(|v| !v.is_finite()) {
        Some(&value) => Err(CoreError::NonFinite { what, value }),
        None => Ok(()),
    }
}

/// Time comparison slack used when matching integration steps to scheduled
/// instants (tstops, sample times, save points).
pub fn time_eps(t: Real) -> Real {
    1e-9 * t.abs().max(1.0)
}
