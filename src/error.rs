//! Errors returned by SDK components.

use std::time::Duration;
use thiserror::Error;

/// A specialized `Result` for trace SDK operations.
pub type TraceResult<T> = Result<T, TraceError>;

/// Errors returned by span processors, exporters and the tracer provider.
#[derive(Error, Debug, PartialEq)]
#[non_exhaustive]
pub enum TraceError {
    /// Shutdown has already been invoked on this component.
    #[error("shutdown already invoked")]
    AlreadyShutdown,

    /// The operation did not finish within the allotted time.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// A component was configured with invalid values.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Operation failed for some reason not covered by the other variants.
    #[error("{0}")]
    InternalFailure(String),
}

impl TraceError {
    /// Wraps an arbitrary error message as an internal failure.
    pub fn internal(message: impl Into<String>) -> Self {
        TraceError::InternalFailure(message.into())
    }
}
