//! RSA signing-credential management.
//!
//! A [`SigningCredential`] pairs an RS256 signing key with the public
//! material needed to advertise it: either the raw RSA parameters extracted
//! from a `SubjectPublicKeyInfo`, or the wrapping X.509 certificate. The
//! first credential in a [`SigningCredentials`] list signs; every credential
//! is published for verification.

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use jsonwebtoken::{DecodingKey, EncodingKey};

use crate::error::{CryptoError, CryptoResult};
use crate::hash::{sha1, sha256};
use crate::jwk::JsonWebKey;

/// Public material of a signing credential.
#[derive(Debug, Clone)]
pub enum KeyMaterial {
    /// Raw RSA public parameters.
    Rsa {
        /// Modulus, big-endian without leading zero.
        modulus: Vec<u8>,
        /// Public exponent, big-endian.
        exponent: Vec<u8>,
    },

    /// X.509-wrapped RSA key; the certificate itself is advertised.
    X509 {
        /// DER-encoded certificate.
        certificate_der: Vec<u8>,
    },
}

/// An RS256 signing credential.
pub struct SigningCredential {
    kid: String,
    material: KeyMaterial,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl std::fmt::Debug for SigningCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningCredential")
            .field("kid", &self.kid)
            .field("material", &self.material)
            .field("encoding_key", &"[REDACTED]")
            .finish()
    }
}

impl SigningCredential {
    /// Creates a credential from a PEM-encoded RSA key pair.
    ///
    /// # Errors
    ///
    /// Returns an error if either PEM fails to decode or the public key is
    /// not an RSA `SubjectPublicKeyInfo`.
    pub fn from_rsa_pem(private_key_pem: &[u8], public_key_pem: &[u8]) -> CryptoResult<Self> {
        let encoding_key = EncodingKey::from_rsa_pem(private_key_pem)
            .map_err(|e| CryptoError::InvalidKey(format!("invalid RSA private key: {e}")))?;
        let decoding_key = DecodingKey::from_rsa_pem(public_key_pem)
            .map_err(|e| CryptoError::InvalidKey(format!("invalid RSA public key: {e}")))?;

        let spki = pem_to_der(public_key_pem)?;
        let (modulus, exponent) = extract_rsa_components(&spki)?;

        Ok(Self {
            kid: derive_key_id(&spki),
            material: KeyMaterial::Rsa { modulus, exponent },
            encoding_key,
            decoding_key,
        })
    }

    /// Creates a credential from a PEM private key and its DER certificate.
    ///
    /// # Errors
    ///
    /// Returns an error if the private key fails to decode or the
    /// certificate does not carry an RSA public key.
    pub fn from_x509_der(private_key_pem: &[u8], certificate_der: &[u8]) -> CryptoResult<Self> {
        let encoding_key = EncodingKey::from_rsa_pem(private_key_pem)
            .map_err(|e| CryptoError::InvalidKey(format!("invalid RSA private key: {e}")))?;

        let spki = extract_certificate_spki(certificate_der)?;
        let (modulus, exponent) = extract_rsa_components(spki)?;
        let kid = derive_key_id(spki);

        let decoding_key = DecodingKey::from_rsa_components(
            &URL_SAFE_NO_PAD.encode(&modulus),
            &URL_SAFE_NO_PAD.encode(&exponent),
        )
        .map_err(|e| CryptoError::InvalidKey(format!("invalid RSA parameters: {e}")))?;

        Ok(Self {
            kid,
            material: KeyMaterial::X509 {
                certificate_der: certificate_der.to_vec(),
            },
            encoding_key,
            decoding_key,
        })
    }

    /// Returns the key ID, derived from the public-key hash.
    #[must_use]
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// Returns the public material.
    #[must_use]
    pub const fn material(&self) -> &KeyMaterial {
        &self.material
    }

    /// Returns the JWT signing key.
    #[must_use]
    pub const fn encoding_key(&self) -> &EncodingKey {
        &self.encoding_key
    }

    /// Returns the JWT verification key.
    #[must_use]
    pub const fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }

    /// Serializes the credential as a JWK.
    #[must_use]
    pub fn to_jwk(&self) -> JsonWebKey {
        let mut key = JsonWebKey {
            kty: "RSA".to_string(),
            key_use: Some("sig".to_string()),
            alg: Some("RS256".to_string()),
            kid: Some(self.kid.clone()),
            x5t: None,
            x5c: None,
            n: None,
            e: None,
        };

        match &self.material {
            KeyMaterial::Rsa { modulus, exponent } => {
                key.n = Some(URL_SAFE_NO_PAD.encode(modulus));
                key.e = Some(URL_SAFE_NO_PAD.encode(exponent));
            }
            KeyMaterial::X509 { certificate_der } => {
                key.x5t = Some(URL_SAFE_NO_PAD.encode(sha1(certificate_der)));
                key.x5c = Some(vec![STANDARD.encode(certificate_der)]);
            }
        }

        key
    }
}

/// Ordered list of signing credentials.
///
/// The first entry signs newly issued tokens; the full list is served by the
/// cryptography endpoint so relying parties can verify during rollover.
#[derive(Debug, Default)]
pub struct SigningCredentials(Vec<SigningCredential>);

impl SigningCredentials {
    /// Creates an empty credential list.
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Appends a credential.
    pub fn push(&mut self, credential: SigningCredential) {
        self.0.push(credential);
    }

    /// Returns the credential used for issuance, if any is configured.
    #[must_use]
    pub fn primary(&self) -> Option<&SigningCredential> {
        self.0.first()
    }

    /// Whether any credential is configured.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        !self.0.is_empty()
    }

    /// Iterates over all credentials.
    pub fn iter(&self) -> impl Iterator<Item = &SigningCredential> {
        self.0.iter()
    }
}

impl FromIterator<SigningCredential> for SigningCredentials {
    fn from_iter<I: IntoIterator<Item = SigningCredential>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Derives a stable key ID from the hash of the `SubjectPublicKeyInfo`.
fn derive_key_id(spki: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(&sha256(spki)[..8])
}

/// Decodes the body of a single PEM block.
fn pem_to_der(pem: &[u8]) -> CryptoResult<Vec<u8>> {
    let text = std::str::from_utf8(pem)
        .map_err(|_| CryptoError::InvalidEncoding("PEM is not UTF-8".to_string()))?;

    let body: String = text
        .lines()
        .filter(|line| !line.starts_with("-----"))
        .collect();

    STANDARD
        .decode(body.trim())
        .map_err(|e| CryptoError::InvalidEncoding(format!("invalid PEM body: {e}")))
}

/// Extracts RSA modulus (n) and exponent (e) from a `SubjectPublicKeyInfo`.
///
/// The structure is:
///
/// ```text
/// SEQUENCE {
///   SEQUENCE { OID, NULL }          -- algorithm
///   BIT STRING {                    -- subjectPublicKey
///     SEQUENCE { INTEGER n, INTEGER e }
///   }
/// }
/// ```
fn extract_rsa_components(spki: &[u8]) -> CryptoResult<(Vec<u8>, Vec<u8>)> {
    let mut pos = 0;

    // Outer SEQUENCE.
    expect_tag(spki, pos, 0x30, "SEQUENCE")?;
    pos += 1;
    pos = skip_length(spki, pos)?;

    // Algorithm SEQUENCE, skipped entirely.
    expect_tag(spki, pos, 0x30, "algorithm SEQUENCE")?;
    pos += 1;
    let alg_len = read_length(spki, pos)?;
    pos = skip_length(spki, pos)?;
    pos += alg_len;

    // BIT STRING wrapping the key, with one unused-bits byte.
    expect_tag(spki, pos, 0x03, "BIT STRING")?;
    pos += 1;
    pos = skip_length(spki, pos)?;
    pos += 1;

    // RSAPublicKey SEQUENCE.
    expect_tag(spki, pos, 0x30, "RSAPublicKey SEQUENCE")?;
    pos += 1;
    pos = skip_length(spki, pos)?;

    let (n, next) = read_integer(spki, pos)?;
    let (e, _) = read_integer(spki, next)?;

    Ok((n, e))
}

/// Locates the `SubjectPublicKeyInfo` inside a DER certificate.
///
/// Walks `Certificate -> tbsCertificate`, skipping the optional version tag,
/// serial number, signature algorithm, issuer, validity and subject fields.
fn extract_certificate_spki(der: &[u8]) -> CryptoResult<&[u8]> {
    let mut pos = 0;

    // Certificate SEQUENCE.
    expect_tag(der, pos, 0x30, "certificate SEQUENCE")?;
    pos += 1;
    pos = skip_length(der, pos)?;

    // tbsCertificate SEQUENCE.
    expect_tag(der, pos, 0x30, "tbsCertificate SEQUENCE")?;
    pos += 1;
    pos = skip_length(der, pos)?;

    // Optional [0] version.
    if der.get(pos) == Some(&0xA0) {
        pos = skip_element(der, pos)?;
    }

    // serialNumber, signature, issuer, validity, subject.
    for _ in 0..5 {
        pos = skip_element(der, pos)?;
    }

    expect_tag(der, pos, 0x30, "subjectPublicKeyInfo SEQUENCE")?;
    let content_len = read_length(der, pos + 1)?;
    let end = skip_length(der, pos + 1)? + content_len;
    der.get(pos..end)
        .ok_or_else(|| CryptoError::InvalidEncoding("truncated certificate".to_string()))
}

/// Checks the tag byte at `pos`.
fn expect_tag(data: &[u8], pos: usize, tag: u8, what: &str) -> CryptoResult<()> {
    if data.get(pos) == Some(&tag) {
        Ok(())
    } else {
        Err(CryptoError::InvalidEncoding(format!("expected {what}")))
    }
}

/// Reads an INTEGER, stripping the ASN.1 leading-zero padding.
fn read_integer(data: &[u8], pos: usize) -> CryptoResult<(Vec<u8>, usize)> {
    expect_tag(data, pos, 0x02, "INTEGER")?;
    let len = read_length(data, pos + 1)?;
    let start = skip_length(data, pos + 1)?;
    let mut value = data
        .get(start..start + len)
        .ok_or_else(|| CryptoError::InvalidEncoding("truncated INTEGER".to_string()))?
        .to_vec();
    if value.first() == Some(&0) {
        value.remove(0);
    }
    Ok((value, start + len))
}

/// Skips a full TLV element and returns the position after it.
fn skip_element(data: &[u8], pos: usize) -> CryptoResult<usize> {
    if data.get(pos).is_none() {
        return Err(CryptoError::InvalidEncoding(
            "unexpected end of data".to_string(),
        ));
    }
    let len = read_length(data, pos + 1)?;
    Ok(skip_length(data, pos + 1)? + len)
}

/// Reads an ASN.1 length field and returns the length value.
fn read_length(data: &[u8], pos: usize) -> CryptoResult<usize> {
    let first = *data
        .get(pos)
        .ok_or_else(|| CryptoError::InvalidEncoding("unexpected end of data".to_string()))?;

    if first < 0x80 {
        Ok(first as usize)
    } else {
        let num_bytes = (first & 0x7F) as usize;
        if num_bytes > 4 {
            return Err(CryptoError::InvalidEncoding("length too large".to_string()));
        }
        let mut len = 0usize;
        for i in 0..num_bytes {
            let byte = *data.get(pos + 1 + i).ok_or_else(|| {
                CryptoError::InvalidEncoding("unexpected end of length".to_string())
            })?;
            len = (len << 8) | (byte as usize);
        }
        Ok(len)
    }
}

/// Skips an ASN.1 length field and returns the position of the content.
fn skip_length(data: &[u8], pos: usize) -> CryptoResult<usize> {
    let first = *data
        .get(pos)
        .ok_or_else(|| CryptoError::InvalidEncoding("unexpected end of data".to_string()))?;

    if first < 0x80 {
        Ok(pos + 1)
    } else {
        Ok(pos + 1 + (first & 0x7F) as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRIVATE_PEM: &[u8] = include_bytes!("../testdata/rsa_private.pem");
    const PUBLIC_PEM: &[u8] = include_bytes!("../testdata/rsa_public.pem");
    const CERT_DER: &[u8] = include_bytes!("../testdata/cert.der");

    #[test]
    fn rsa_pem_credential_exposes_parameters() {
        let credential = SigningCredential::from_rsa_pem(PRIVATE_PEM, PUBLIC_PEM).unwrap();

        let KeyMaterial::Rsa { modulus, exponent } = credential.material() else {
            panic!("expected raw RSA material");
        };
        // 2048-bit modulus, F4 exponent.
        assert_eq!(modulus.len(), 256);
        assert_eq!(exponent, &[0x01, 0x00, 0x01]);
        assert!(!credential.kid().is_empty());
    }

    #[test]
    fn x509_credential_exposes_certificate() {
        let credential = SigningCredential::from_x509_der(PRIVATE_PEM, CERT_DER).unwrap();

        let jwk = credential.to_jwk();
        assert_eq!(jwk.kty, "RSA");
        assert_eq!(jwk.alg.as_deref(), Some("RS256"));
        assert!(jwk.x5t.is_some());
        assert_eq!(jwk.x5c.as_ref().map(Vec::len), Some(1));
        assert!(jwk.n.is_none(), "X.509 keys advertise the chain, not n/e");
    }

    #[test]
    fn certificate_and_pem_derive_the_same_key_id() {
        // Both wrap the same RSA key, so the SPKI-derived kid must agree.
        let pem = SigningCredential::from_rsa_pem(PRIVATE_PEM, PUBLIC_PEM).unwrap();
        let x509 = SigningCredential::from_x509_der(PRIVATE_PEM, CERT_DER).unwrap();
        assert_eq!(pem.kid(), x509.kid());
    }

    #[test]
    fn rsa_jwk_round_trips_through_serde() {
        let credential = SigningCredential::from_rsa_pem(PRIVATE_PEM, PUBLIC_PEM).unwrap();
        let json = serde_json::to_string(&credential.to_jwk()).unwrap();
        assert!(json.contains("\"n\":"));
        assert!(json.contains("\"e\":\"AQAB\""));
    }

    #[test]
    fn garbage_pem_is_rejected() {
        assert!(SigningCredential::from_rsa_pem(b"not a key", b"not a key").is_err());
    }

    #[test]
    fn primary_is_first_credential() {
        let mut credentials = SigningCredentials::new();
        assert!(!credentials.is_configured());
        assert!(credentials.primary().is_none());

        credentials.push(SigningCredential::from_rsa_pem(PRIVATE_PEM, PUBLIC_PEM).unwrap());
        credentials.push(SigningCredential::from_x509_der(PRIVATE_PEM, CERT_DER).unwrap());

        assert!(credentials.is_configured());
        assert!(matches!(
            credentials.primary().unwrap().material(),
            KeyMaterial::Rsa { .. }
        ));
        assert_eq!(credentials.iter().count(), 2);
    }
}
