//! fdm-results: logged simulation output.
//!
//! A run appends `(t, y)` samples; [`TimeSeries`] views that log column-wise
//! and [`JsonlWriter`] streams samples to any `Write` sink.

pub mod series;
pub mod writer;

pub use series::{Fields, TimeSeries};
pub use writer::{JsonlWriter, Sample};

pub type ResultsResult<T> = Result<T, ResultsError>;

#[derive(thiserror::Error, Debug)]
pub enum ResultsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Log length mismatch: {times} times, {values} values")]
    LengthMismatch { times: usize, values: usize },

    #[error("Sample {index} differs in shape from the first sample")]
    ShapeChanged { index: usize },

    #[error("No field '{path}' in logged output")]
    FieldNotFound { path: String },
}
