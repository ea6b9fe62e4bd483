//! Common protocol types.
//!
//! Response types, response modes and grant kinds from OAuth 2.0 and
//! `OpenID` Connect, plus the flow classification used by the authorization
//! pipeline.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// A single `response_type` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ResponseType {
    /// No credential is issued; only `state` round-trips.
    None,

    /// Authorization code.
    Code,

    /// Access token (implicit).
    Token,

    /// Identity token.
    IdToken,
}

impl fmt::Display for ResponseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::None => "none",
            Self::Code => "code",
            Self::Token => "token",
            Self::IdToken => "id_token",
        };
        write!(f, "{s}")
    }
}

impl FromStr for ResponseType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "code" => Ok(Self::Code),
            "token" => Ok(Self::Token),
            "id_token" => Ok(Self::IdToken),
            _ => Err(format!("unknown response type: {s}")),
        }
    }
}

/// The space-separated `response_type` set of an authorization request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResponseTypes(pub BTreeSet<ResponseType>);

impl ResponseTypes {
    /// Whether the set contains the given value.
    #[must_use]
    pub fn contains(&self, value: ResponseType) -> bool {
        self.0.contains(&value)
    }

    /// Checks if this is the none flow.
    #[must_use]
    pub fn is_none_flow(&self) -> bool {
        self.0.len() == 1 && self.0.contains(&ResponseType::None)
    }

    /// Checks if this is the authorization code flow.
    #[must_use]
    pub fn is_code_flow(&self) -> bool {
        self.0.len() == 1 && self.0.contains(&ResponseType::Code)
    }

    /// Checks if this is an implicit flow.
    #[must_use]
    pub fn is_implicit_flow(&self) -> bool {
        !self.0.contains(&ResponseType::Code)
            && !self.0.contains(&ResponseType::None)
            && (self.0.contains(&ResponseType::Token) || self.0.contains(&ResponseType::IdToken))
    }

    /// Checks if this is a hybrid flow.
    #[must_use]
    pub fn is_hybrid_flow(&self) -> bool {
        self.0.contains(&ResponseType::Code)
            && !self.0.contains(&ResponseType::None)
            && (self.0.contains(&ResponseType::Token) || self.0.contains(&ResponseType::IdToken))
    }

    /// Whether the combination names a recognized flow.
    ///
    /// Rejects the empty set and combinations such as `none code`.
    #[must_use]
    pub fn is_recognized_flow(&self) -> bool {
        self.is_none_flow() || self.is_code_flow() || self.is_implicit_flow() || self.is_hybrid_flow()
    }
}

impl FromStr for ResponseTypes {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut types = BTreeSet::new();
        for part in s.split_whitespace() {
            types.insert(ResponseType::from_str(part)?);
        }
        Ok(Self(types))
    }
}

/// OAuth 2.0 response modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    /// Parameters appended to the redirect URI query.
    Query,

    /// Parameters appended to the redirect URI fragment.
    Fragment,

    /// Parameters delivered through a self-submitting HTML form.
    FormPost,
}

impl fmt::Display for ResponseMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Query => "query",
            Self::Fragment => "fragment",
            Self::FormPost => "form_post",
        };
        write!(f, "{s}")
    }
}

impl FromStr for ResponseMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "query" => Ok(Self::Query),
            "fragment" => Ok(Self::Fragment),
            "form_post" => Ok(Self::FormPost),
            _ => Err(format!("unknown response mode: {s}")),
        }
    }
}

/// Token endpoint grant kinds.
///
/// Unknown values are carried through as [`GrantKind::Custom`] so the host
/// can implement extension grants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrantKind {
    /// `authorization_code` (RFC 6749 §4.1).
    AuthorizationCode,

    /// `refresh_token` (RFC 6749 §6).
    RefreshToken,

    /// `password` (RFC 6749 §4.3).
    Password,

    /// `client_credentials` (RFC 6749 §4.4).
    ClientCredentials,

    /// A host-defined extension grant.
    Custom(String),
}

impl GrantKind {
    /// Parses a `grant_type` value.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value {
            "authorization_code" => Self::AuthorizationCode,
            "refresh_token" => Self::RefreshToken,
            "password" => Self::Password,
            "client_credentials" => Self::ClientCredentials,
            other => Self::Custom(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_types_flow_detection() {
        let code: ResponseTypes = "code".parse().unwrap();
        assert!(code.is_code_flow());
        assert!(!code.is_implicit_flow());
        assert!(!code.is_hybrid_flow());

        let implicit: ResponseTypes = "token id_token".parse().unwrap();
        assert!(implicit.is_implicit_flow());
        assert!(!implicit.is_hybrid_flow());

        let hybrid: ResponseTypes = "code id_token token".parse().unwrap();
        assert!(hybrid.is_hybrid_flow());
        assert!(!hybrid.is_implicit_flow());

        let none: ResponseTypes = "none".parse().unwrap();
        assert!(none.is_none_flow());
        assert!(none.is_recognized_flow());
    }

    #[test]
    fn unknown_response_type_is_rejected() {
        assert!("code bogus".parse::<ResponseTypes>().is_err());
    }

    #[test]
    fn none_combined_with_other_types_is_not_a_flow() {
        let mixed: ResponseTypes = "none code".parse().unwrap();
        assert!(!mixed.is_recognized_flow());
    }

    #[test]
    fn empty_response_type_is_not_a_flow() {
        let empty: ResponseTypes = "".parse().unwrap();
        assert!(!empty.is_recognized_flow());
    }

    #[test]
    fn grant_kind_parses_extension_grants() {
        assert_eq!(
            GrantKind::parse("refresh_token"),
            GrantKind::RefreshToken
        );
        assert_eq!(
            GrantKind::parse("urn:example:grant"),
            GrantKind::Custom("urn:example:grant".to_string())
        );
    }
}
