//! Error types for key loading and serialization.

use thiserror::Error;

/// Errors raised while loading or serializing key material.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// A PEM or DER structure could not be decoded.
    #[error("invalid key encoding: {0}")]
    InvalidEncoding(String),

    /// The key material is structurally valid but unusable.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// JWT signing failed.
    #[error("signing failed: {0}")]
    Signing(String),
}

/// Result type for crypto operations.
pub type CryptoResult<T> = Result<T, CryptoError>;
