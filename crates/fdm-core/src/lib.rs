//! fdm-core: shared foundation for the flight-dynamics runtime.
//!
//! Contains:
//! - numeric (Real + tolerances + float helpers)
//! - ids (compact node identifiers for the system arena)
//! - timing (step timers and accumulators for run diagnostics)
//! - error (shared error types)

pub mod error;
pub mod ids;
pub mod numeric;
pub mod timing;

pub use error::{CoreError, CoreResult};
pub use ids::*;
pub use numeric::*;
pub use timing::{AccumulatingTimer, Timer};
