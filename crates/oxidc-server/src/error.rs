//! Protocol error types.
//!
//! Error kinds map onto the OAuth 2.0 / `OpenID` Connect error strings of
//! RFC 6749 §5.2 and `OpenID` Connect Core §3.1.2.6.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Protocol errors raised by the endpoint pipelines.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Malformed or policy-violating request parameters.
    #[error("invalid_request: {0}")]
    InvalidRequest(String),

    /// Client authentication or client validation failed.
    #[error("invalid_client: {0}")]
    InvalidClient(String),

    /// Invalid, expired or mismatched grant.
    #[error("invalid_grant: {0}")]
    InvalidGrant(String),

    /// The client may not use this grant type.
    #[error("unauthorized_client: {0}")]
    UnauthorizedClient(String),

    /// Unknown or missing grant type.
    #[error("unsupported_grant_type: {0}")]
    UnsupportedGrantType(String),

    /// Unknown or disallowed response type.
    #[error("unsupported_response_type: {0}")]
    UnsupportedResponseType(String),

    /// Internal failure during request processing.
    #[error("server_error: {0}")]
    ServerError(String),
}

impl ProtocolError {
    /// Returns the OAuth 2.0 error code.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request",
            Self::InvalidClient(_) => "invalid_client",
            Self::InvalidGrant(_) => "invalid_grant",
            Self::UnauthorizedClient(_) => "unauthorized_client",
            Self::UnsupportedGrantType(_) => "unsupported_grant_type",
            Self::UnsupportedResponseType(_) => "unsupported_response_type",
            Self::ServerError(_) => "server_error",
        }
    }

    /// Returns the human-readable description.
    #[must_use]
    pub fn description(&self) -> &str {
        match self {
            Self::InvalidRequest(s)
            | Self::InvalidClient(s)
            | Self::InvalidGrant(s)
            | Self::UnauthorizedClient(s)
            | Self::UnsupportedGrantType(s)
            | Self::UnsupportedResponseType(s)
            | Self::ServerError(s) => s,
        }
    }

    /// Converts the error into its wire representation.
    #[must_use]
    pub fn to_payload(&self) -> ErrorPayload {
        ErrorPayload {
            error: self.error_code().to_string(),
            error_description: Some(self.description().to_string()),
            error_uri: None,
        }
    }
}

/// OAuth 2.0 error response payload.
///
/// Pipelines build these from [`ProtocolError`]; host hooks that reject a
/// request supply one directly, which lets them use extension error codes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Error code.
    pub error: String,

    /// Human-readable error description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,

    /// URI with more information about the error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_uri: Option<String>,
}

impl From<ProtocolError> for ErrorPayload {
    fn from(error: ProtocolError) -> Self {
        error.to_payload()
    }
}
