//! Cache error types.

use thiserror::Error;

/// Errors raised by cache backends.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The backend could not be reached.
    #[error("cache connection error: {0}")]
    Connection(String),

    /// The backend rejected the operation.
    #[error("cache operation failed: {0}")]
    Operation(String),
}

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;
