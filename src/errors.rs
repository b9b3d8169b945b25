//! Error types for the resource pool

use thiserror::Error;

/// Error produced by a resource factory.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("Operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("{0} has been disposed")]
    ObjectDisposed(&'static str),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Invalid pool configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Metrics export failed: {0}")]
    Metrics(String),
}

pub type PoolResult<T> = Result<T, PoolError>;
