//! Errors shared by the lifecycle operations of readers, exporters and the
//! meter provider.
use std::sync::PoisonError;
use std::time::Duration;
use thiserror::Error;

/// Outcome of an export, flush or shutdown.
pub type SdkResult = Result<(), SdkError>;

/// Errors returned by export, flush and shutdown operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum SdkError {
    /// The component was already shut down.
    ///
    /// Returned by exporters and readers when they are used, or shut down
    /// again, after a completed shutdown.
    #[error("Shutdown already invoked")]
    AlreadyShutdown,

    /// The operation did not finish within the allotted time.
    ///
    /// A timed out shutdown still releases its resources.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// The operation failed. The message describes the failure.
    #[error("Operation failed: {0}")]
    InternalFailure(String),
}

impl<T> From<PoisonError<T>> for SdkError {
    fn from(err: PoisonError<T>) -> Self {
        SdkError::InternalFailure(format!("lock poisoned: {err}"))
    }
}
