//! Digest helpers.
//!
//! SHA-256 backs the `c_hash`/`at_hash` identity-token claims, SHA-1 the
//! X.509 `x5t` thumbprint, SHA-512 is available for hosts that derive their
//! own hash claims.

use sha1::Digest;

/// Computes a SHA-1 digest.
///
/// SHA-1 survives here solely because JWK `x5t` thumbprints are defined over
/// it (RFC 7517 §4.8); it is not used for any integrity decision.
#[must_use]
pub fn sha1(data: &[u8]) -> Vec<u8> {
    sha1::Sha1::digest(data).to_vec()
}

/// Computes a SHA-256 digest.
#[must_use]
pub fn sha256(data: &[u8]) -> Vec<u8> {
    sha2::Sha256::digest(data).to_vec()
}

/// Computes a SHA-512 digest.
#[must_use]
pub fn sha512(data: &[u8]) -> Vec<u8> {
    sha2::Sha512::digest(data).to_vec()
}
