use std::result;
use std::sync::PoisonError;
use thiserror::Error;

/// A specialized `Result` type for metric operations.
pub type MetricResult<T> = result::Result<T, MetricError>;

/// Errors returned by the metrics API.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum MetricError {
    /// A caller supplied value was rejected, e.g. a negative counter increment.
    ///
    /// The instrument is left untouched.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    /// Other errors not covered by specific cases.
    #[error("Metrics error: {0}")]
    Other(String),
}

impl<T> From<PoisonError<T>> for MetricError {
    fn from(err: PoisonError<T>) -> Self {
        MetricError::Other(err.to_string())
    }
}
