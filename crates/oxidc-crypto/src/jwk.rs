//! JSON Web Key types.
//!
//! The subset of RFC 7517 needed by the cryptography endpoint: RSA signature
//! keys, either as raw `n`/`e` parameters or as an X.509 chain.

use serde::{Deserialize, Serialize};

/// JSON Web Key Set, the document served by the cryptography endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonWebKeySet {
    /// Array of JSON Web Keys.
    pub keys: Vec<JsonWebKey>,
}

impl JsonWebKeySet {
    /// Creates a JWKS with the given keys.
    #[must_use]
    pub const fn with_keys(keys: Vec<JsonWebKey>) -> Self {
        Self { keys }
    }

    /// Finds a key by its ID.
    #[must_use]
    pub fn find_key(&self, kid: &str) -> Option<&JsonWebKey> {
        self.keys.iter().find(|k| k.kid.as_deref() == Some(kid))
    }
}

/// A single JSON Web Key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonWebKey {
    /// Key type; always `RSA` for keys produced by this server.
    pub kty: String,

    /// Public key use (`sig`).
    #[serde(rename = "use", skip_serializing_if = "Option::is_none")]
    pub key_use: Option<String>,

    /// Intended algorithm (`RS256`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,

    /// Key ID, matched against the `kid` header of issued tokens.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,

    /// X.509 certificate SHA-1 thumbprint, base64url.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x5t: Option<String>,

    /// X.509 certificate chain, standard base64 DER.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x5c: Option<Vec<String>>,

    /// RSA modulus, base64url.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,

    /// RSA public exponent, base64url.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rsa_key(kid: &str) -> JsonWebKey {
        JsonWebKey {
            kty: "RSA".to_string(),
            key_use: Some("sig".to_string()),
            alg: Some("RS256".to_string()),
            kid: Some(kid.to_string()),
            x5t: None,
            x5c: None,
            n: Some("AQAB".to_string()),
            e: Some("AQAB".to_string()),
        }
    }

    #[test]
    fn find_key_by_id() {
        let set = JsonWebKeySet::with_keys(vec![rsa_key("a"), rsa_key("b")]);
        assert!(set.find_key("b").is_some());
        assert!(set.find_key("c").is_none());
    }

    #[test]
    fn serialization_skips_absent_fields() {
        let json = serde_json::to_string(&rsa_key("a")).unwrap();
        assert!(json.contains("\"kty\":\"RSA\""));
        assert!(json.contains("\"use\":\"sig\""));
        assert!(!json.contains("x5t"));
        assert!(!json.contains("x5c"));
    }
}
