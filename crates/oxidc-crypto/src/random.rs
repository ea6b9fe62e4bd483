//! Cryptographically secure random generation.
//!
//! Authorization codes, refresh tokens and cached-request identifiers are all
//! 256-bit random values encoded as unpadded base64url. The entropy source is
//! injectable so tests can pin key material.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng;

/// Source of random bytes.
///
/// The default implementation draws from the operating-system RNG. Hosts only
/// replace this in tests.
pub trait Entropy: Send + Sync {
    /// Fills and returns `len` random bytes.
    fn random_bytes(&self, len: usize) -> Vec<u8>;
}

/// Operating-system backed entropy source.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsEntropy;

impl Entropy for OsEntropy {
    fn random_bytes(&self, len: usize) -> Vec<u8> {
        random_bytes(len)
    }
}

/// Generates `len` cryptographically secure random bytes.
#[must_use]
pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut rng = rand::rng();
    let mut bytes = vec![0u8; len];
    rng.fill(&mut bytes[..]);
    bytes
}

/// Generates an opaque 256-bit key, base64url-encoded without padding.
///
/// Used for authorization codes, refresh tokens and request identifiers.
/// 256 bits comfortably exceeds the 128-bit minimum of RFC 6749 §10.10.
#[must_use]
pub fn random_key(entropy: &dyn Entropy) -> String {
    URL_SAFE_NO_PAD.encode(entropy.random_bytes(32))
}
