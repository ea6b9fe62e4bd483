//! OIDC message codec.
//!
//! An [`OidcMessage`] is an ordered string-to-string parameter mapping with a
//! request-kind tag, used for both inbound requests (query or form) and
//! outbound responses. Arbitrary extra parameters are preserved, which is
//! what allows cached authorization requests to round-trip unknown
//! extensions.
//!
//! Emission supports the three `OpenID` Connect response modes (`query`,
//! `fragment`, `form_post`) and the versioned binary blob format used by the
//! request cache.

use axum::http::{StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use thiserror::Error;

use crate::types::ResponseMode;

/// Well-known parameter names.
pub mod params {
    /// `client_id`.
    pub const CLIENT_ID: &str = "client_id";
    /// `client_secret`.
    pub const CLIENT_SECRET: &str = "client_secret";
    /// `redirect_uri`.
    pub const REDIRECT_URI: &str = "redirect_uri";
    /// `response_type`.
    pub const RESPONSE_TYPE: &str = "response_type";
    /// `response_mode`.
    pub const RESPONSE_MODE: &str = "response_mode";
    /// `scope`.
    pub const SCOPE: &str = "scope";
    /// `state`.
    pub const STATE: &str = "state";
    /// `nonce`.
    pub const NONCE: &str = "nonce";
    /// `code`.
    pub const CODE: &str = "code";
    /// `grant_type`.
    pub const GRANT_TYPE: &str = "grant_type";
    /// `refresh_token`.
    pub const REFRESH_TOKEN: &str = "refresh_token";
    /// `id_token`.
    pub const ID_TOKEN: &str = "id_token";
    /// `access_token`.
    pub const ACCESS_TOKEN: &str = "access_token";
    /// `token`.
    pub const TOKEN: &str = "token";
    /// `token_type`.
    pub const TOKEN_TYPE: &str = "token_type";
    /// `expires_in`.
    pub const EXPIRES_IN: &str = "expires_in";
    /// `resource`.
    pub const RESOURCE: &str = "resource";
    /// `audience`.
    pub const AUDIENCE: &str = "audience";
    /// `username`.
    pub const USERNAME: &str = "username";
    /// `password`.
    pub const PASSWORD: &str = "password";
    /// `id_token_hint`.
    pub const ID_TOKEN_HINT: &str = "id_token_hint";
    /// `post_logout_redirect_uri`.
    pub const POST_LOGOUT_REDIRECT_URI: &str = "post_logout_redirect_uri";
    /// `error`.
    pub const ERROR: &str = "error";
    /// `error_description`.
    pub const ERROR_DESCRIPTION: &str = "error_description";
    /// `error_uri`.
    pub const ERROR_URI: &str = "error_uri";
    /// `unique_id` — internal parameter binding a cached authorization
    /// request to later round-trips.
    pub const UNIQUE_ID: &str = "unique_id";
}

/// The protocol role of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// Authorization endpoint traffic.
    Authentication,

    /// Token, validation and revocation-style traffic.
    Token,

    /// End-session traffic.
    Logout,
}

/// Blob format version accepted by [`OidcMessage::from_blob`].
const BLOB_VERSION: i32 = 1;

/// Errors raised while decoding a cached request blob.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// The blob was written by an incompatible serializer.
    #[error("unsupported blob version {0}")]
    UnsupportedVersion(i32),

    /// The blob ended before the declared entry count was read.
    #[error("truncated blob")]
    Truncated,

    /// An entry was not valid UTF-8.
    #[error("blob entry is not UTF-8")]
    InvalidUtf8,
}

/// An ordered OIDC parameter mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OidcMessage {
    kind: RequestKind,
    parameters: Vec<(String, String)>,
}

impl OidcMessage {
    /// Creates an empty message.
    #[must_use]
    pub const fn new(kind: RequestKind) -> Self {
        Self {
            kind,
            parameters: Vec::new(),
        }
    }

    /// Creates a message from decoded query or form pairs.
    ///
    /// Later duplicates of a key are ignored; the first occurrence wins, as
    /// it does for the ASP.NET-style readers this server interoperates with.
    #[must_use]
    pub fn from_pairs(kind: RequestKind, pairs: Vec<(String, String)>) -> Self {
        let mut message = Self::new(kind);
        for (key, value) in pairs {
            if !message.contains(&key) {
                message.parameters.push((key, value));
            }
        }
        message
    }

    /// Returns the message kind.
    #[must_use]
    pub const fn kind(&self) -> RequestKind {
        self.kind
    }

    /// Gets a parameter value.
    ///
    /// Empty values are treated as absent, mirroring query-string semantics.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .filter(|v| !v.is_empty())
    }

    /// Whether the parameter is present (even if empty).
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.parameters.iter().any(|(k, _)| k == key)
    }

    /// Sets a parameter, replacing an existing value in place.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        if let Some(entry) = self.parameters.iter_mut().find(|(k, _)| k == key) {
            entry.1 = value;
        } else {
            self.parameters.push((key.to_string(), value));
        }
    }

    /// Removes a parameter, returning its previous value.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        let index = self.parameters.iter().position(|(k, _)| k == key)?;
        Some(self.parameters.remove(index).1)
    }

    /// Iterates over parameters in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.parameters
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of parameters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    /// Whether the message carries no parameters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    // Well-known accessors.

    /// `client_id`.
    #[must_use]
    pub fn client_id(&self) -> Option<&str> {
        self.get(params::CLIENT_ID)
    }

    /// `client_secret`.
    #[must_use]
    pub fn client_secret(&self) -> Option<&str> {
        self.get(params::CLIENT_SECRET)
    }

    /// `redirect_uri`.
    #[must_use]
    pub fn redirect_uri(&self) -> Option<&str> {
        self.get(params::REDIRECT_URI)
    }

    /// `response_type`.
    #[must_use]
    pub fn response_type(&self) -> Option<&str> {
        self.get(params::RESPONSE_TYPE)
    }

    /// `response_mode`.
    #[must_use]
    pub fn response_mode(&self) -> Option<&str> {
        self.get(params::RESPONSE_MODE)
    }

    /// `scope`.
    #[must_use]
    pub fn scope(&self) -> Option<&str> {
        self.get(params::SCOPE)
    }

    /// Whether the space-separated `scope` parameter contains `value`.
    #[must_use]
    pub fn has_scope(&self, value: &str) -> bool {
        self.scope()
            .is_some_and(|s| s.split_whitespace().any(|part| part == value))
    }

    /// `state`.
    #[must_use]
    pub fn state(&self) -> Option<&str> {
        self.get(params::STATE)
    }

    /// `nonce`.
    #[must_use]
    pub fn nonce(&self) -> Option<&str> {
        self.get(params::NONCE)
    }

    /// `code`.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.get(params::CODE)
    }

    /// `grant_type`.
    #[must_use]
    pub fn grant_type(&self) -> Option<&str> {
        self.get(params::GRANT_TYPE)
    }

    /// `refresh_token`.
    #[must_use]
    pub fn refresh_token(&self) -> Option<&str> {
        self.get(params::REFRESH_TOKEN)
    }

    /// `id_token`.
    #[must_use]
    pub fn id_token(&self) -> Option<&str> {
        self.get(params::ID_TOKEN)
    }

    /// `access_token`.
    #[must_use]
    pub fn access_token(&self) -> Option<&str> {
        self.get(params::ACCESS_TOKEN)
    }

    /// `token`.
    #[must_use]
    pub fn token(&self) -> Option<&str> {
        self.get(params::TOKEN)
    }

    /// `resource`.
    #[must_use]
    pub fn resource(&self) -> Option<&str> {
        self.get(params::RESOURCE)
    }

    /// `audience`.
    #[must_use]
    pub fn audience(&self) -> Option<&str> {
        self.get(params::AUDIENCE)
    }

    /// `post_logout_redirect_uri`.
    #[must_use]
    pub fn post_logout_redirect_uri(&self) -> Option<&str> {
        self.get(params::POST_LOGOUT_REDIRECT_URI)
    }

    /// The internal `unique_id`.
    #[must_use]
    pub fn unique_id(&self) -> Option<&str> {
        self.get(params::UNIQUE_ID)
    }

    // Blob codec.

    /// Serializes the parameters into the versioned request-cache format.
    ///
    /// Layout, little-endian: `version: i32 | count: i32 | count ×
    /// (key_len: i32, key, value_len: i32, value)`.
    #[must_use]
    pub fn to_blob(&self) -> Vec<u8> {
        let mut blob = Vec::with_capacity(64);
        blob.extend_from_slice(&BLOB_VERSION.to_le_bytes());
        blob.extend_from_slice(&(self.parameters.len() as i32).to_le_bytes());
        for (key, value) in &self.parameters {
            write_string(&mut blob, key);
            write_string(&mut blob, value);
        }
        blob
    }

    /// Deserializes a request-cache blob.
    ///
    /// # Errors
    ///
    /// Returns an error if the version is not `1`, the blob is truncated, or
    /// an entry is not valid UTF-8.
    pub fn from_blob(kind: RequestKind, blob: &[u8]) -> Result<Self, DecodeError> {
        let mut pos = 0;
        let version = read_i32(blob, &mut pos)?;
        if version != BLOB_VERSION {
            return Err(DecodeError::UnsupportedVersion(version));
        }

        let count = read_i32(blob, &mut pos)?;
        if count < 0 {
            return Err(DecodeError::Truncated);
        }

        let mut message = Self::new(kind);
        for _ in 0..count {
            let key = read_string(blob, &mut pos)?;
            let value = read_string(blob, &mut pos)?;
            message.parameters.push((key, value));
        }
        Ok(message)
    }

    // Emission.

    /// Emits the message as a response in the given mode.
    ///
    /// The `redirect_uri` parameter itself is never emitted.
    #[must_use]
    pub fn to_response(&self, redirect_uri: &str, mode: ResponseMode) -> Response {
        match mode {
            ResponseMode::Query => redirect(&self.append_to_uri(redirect_uri, '?')),
            ResponseMode::Fragment => redirect(&self.append_to_uri(redirect_uri, '#')),
            ResponseMode::FormPost => self.to_form_post(redirect_uri),
        }
    }

    /// Appends the parameters to `uri` after `separator` (`?` or `#`).
    fn append_to_uri(&self, uri: &str, separator: char) -> String {
        let mut result = String::from(uri);
        let mut first = !(separator == '?' && uri.contains('?'));
        for (key, value) in self.iter() {
            if key == params::REDIRECT_URI {
                continue;
            }
            result.push(if first { separator } else { '&' });
            first = false;
            result.push_str(&urlencoding::encode(key));
            result.push('=');
            result.push_str(&urlencoding::encode(value));
        }
        result
    }

    /// Emits a self-submitting HTML form posting to `action`.
    fn to_form_post(&self, action: &str) -> Response {
        let fields: String = self
            .iter()
            .filter(|(key, _)| *key != params::REDIRECT_URI)
            .map(|(key, value)| {
                format!(
                    r#"<input type="hidden" name="{}" value="{}" />"#,
                    html_escape(key),
                    html_escape(value)
                )
            })
            .collect::<Vec<_>>()
            .join("\n");

        let html = format!(
            r#"<!DOCTYPE html>
<html>
<head><title>Submitting...</title></head>
<body onload="document.forms[0].submit()">
<form method="post" action="{}">
{}
<noscript><button type="submit">Continue</button></noscript>
</form>
</body>
</html>"#,
            html_escape(action),
            fields
        );

        (StatusCode::OK, Html(html)).into_response()
    }
}

/// Builds a 302 redirect.
fn redirect(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

/// HTML entity escaping for the form-post document.
pub(crate) fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

fn write_string(blob: &mut Vec<u8>, value: &str) {
    blob.extend_from_slice(&(value.len() as i32).to_le_bytes());
    blob.extend_from_slice(value.as_bytes());
}

fn read_i32(blob: &[u8], pos: &mut usize) -> Result<i32, DecodeError> {
    let bytes: [u8; 4] = blob
        .get(*pos..*pos + 4)
        .ok_or(DecodeError::Truncated)?
        .try_into()
        .map_err(|_| DecodeError::Truncated)?;
    *pos += 4;
    Ok(i32::from_le_bytes(bytes))
}

fn read_string(blob: &[u8], pos: &mut usize) -> Result<String, DecodeError> {
    let len = read_i32(blob, pos)?;
    let len = usize::try_from(len).map_err(|_| DecodeError::Truncated)?;
    let bytes = blob.get(*pos..*pos + len).ok_or(DecodeError::Truncated)?;
    *pos += len;
    String::from_utf8(bytes.to_vec()).map_err(|_| DecodeError::InvalidUtf8)
}
