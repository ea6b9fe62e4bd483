//! # oxidc-crypto
//!
//! Cryptographic building blocks for the oxidc authorization server:
//!
//! - Secure random key material for authorization codes, refresh tokens and
//!   request identifiers
//! - SHA-1/SHA-256/SHA-512 digests (certificate thumbprints, hash claims)
//! - RSA signing credentials backed by RS256, loaded from PEM key pairs or
//!   X.509 certificates
//! - JWK / JWKS serialization for the cryptography endpoint

#![forbid(unsafe_code)]

mod error;
mod hash;
mod jwk;
mod keys;
mod random;

pub use error::{CryptoError, CryptoResult};
pub use hash::{sha1, sha256, sha512};
pub use jwk::{JsonWebKey, JsonWebKeySet};
pub use keys::{KeyMaterial, SigningCredential, SigningCredentials};
pub use random::{Entropy, OsEntropy, random_bytes, random_key};
