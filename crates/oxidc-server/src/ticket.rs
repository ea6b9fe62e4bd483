//! Authentication tickets.
//!
//! A ticket is the unit of state behind every issued credential: the
//! authenticated [`Principal`], a property bag with dedicated slots for the
//! protocol-relevant metadata, and the authentication scheme that produced
//! it. Codes and refresh tokens are serialized tickets; access and identity
//! tokens are projections of one.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Well-known claim names.
pub mod claims {
    /// Subject identifier.
    pub const SUB: &str = "sub";
    /// Name identifier, the fallback subject source.
    pub const NAME_ID: &str = "name_id";
    /// Issuer.
    pub const ISS: &str = "iss";
    /// Audience.
    pub const AUD: &str = "aud";
    /// Issued-at time.
    pub const IAT: &str = "iat";
    /// Expiration time.
    pub const EXP: &str = "exp";
    /// Nonce.
    pub const NONCE: &str = "nonce";
    /// Access token hash.
    pub const AT_HASH: &str = "at_hash";
    /// Code hash.
    pub const C_HASH: &str = "c_hash";
    /// Scope.
    pub const SCOPE: &str = "scope";
}

/// Token kinds a claim may be copied into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Destination {
    /// The claim is emitted into identity tokens.
    #[serde(rename = "id_token")]
    IdToken,

    /// The claim is emitted into access tokens.
    #[serde(rename = "token")]
    AccessToken,
}

/// A single claim with its emission destinations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    /// Claim type.
    pub kind: String,

    /// Claim value.
    pub value: String,

    /// Token kinds this claim may appear in. An empty set keeps the claim
    /// private to the serialized ticket.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub destinations: BTreeSet<Destination>,
}

impl Claim {
    /// Creates a claim with no destinations.
    #[must_use]
    pub fn new(kind: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            value: value.into(),
            destinations: BTreeSet::new(),
        }
    }

    /// Adds a destination.
    #[must_use]
    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.destinations.insert(destination);
        self
    }

    /// Whether the claim may be emitted into the given token kind.
    #[must_use]
    pub fn allows(&self, destination: Destination) -> bool {
        self.destinations.contains(&destination)
    }
}

/// The authenticated identity carried by a ticket.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    claims: Vec<Claim>,
}

impl Principal {
    /// Creates a principal with no claims.
    #[must_use]
    pub const fn new() -> Self {
        Self { claims: Vec::new() }
    }

    /// Appends a claim.
    pub fn add_claim(&mut self, claim: Claim) {
        self.claims.push(claim);
    }

    /// Builder-style claim append.
    #[must_use]
    pub fn with_claim(mut self, claim: Claim) -> Self {
        self.add_claim(claim);
        self
    }

    /// Returns the first claim of the given type.
    #[must_use]
    pub fn find(&self, kind: &str) -> Option<&Claim> {
        self.claims.iter().find(|c| c.kind == kind)
    }

    /// Iterates over all claims.
    pub fn claims(&self) -> impl Iterator<Item = &Claim> {
        self.claims.iter()
    }

    /// Returns a copy keeping only the claims matching `predicate`.
    ///
    /// The source principal is left untouched.
    #[must_use]
    pub fn filter(&self, predicate: impl Fn(&Claim) -> bool) -> Self {
        Self {
            claims: self.claims.iter().filter(|c| predicate(c)).cloned().collect(),
        }
    }

    /// Resolves the subject: the `sub` claim, falling back to the name
    /// identifier.
    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        self.find(claims::SUB)
            .or_else(|| self.find(claims::NAME_ID))
            .map(|c| c.value.as_str())
    }
}

/// Property-bag keys with dedicated accessors.
mod slots {
    pub const ISSUED: &str = ".issued";
    pub const EXPIRES: &str = ".expires";
    pub const CLIENT_ID: &str = ".client_id";
    pub const REDIRECT_URI: &str = ".redirect_uri";
    pub const RESOURCE: &str = ".resource";
    pub const SCOPE: &str = ".scope";
    pub const AUDIENCES: &str = ".audiences";
}

/// String-to-string metadata attached to a ticket.
///
/// Invariant: `issued_utc ≤ expires_utc` whenever both are set. The issuance
/// paths maintain it by deriving `expires` from `issued` plus a lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketProperties {
    entries: BTreeMap<String, String>,
}

impl TicketProperties {
    /// Creates an empty property bag.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Gets a raw property.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Sets a raw property.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.entries.insert(key.to_string(), value.into());
    }

    /// Removes a raw property.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.entries.remove(key)
    }

    /// The issue instant.
    #[must_use]
    pub fn issued_utc(&self) -> Option<DateTime<Utc>> {
        self.get_instant(slots::ISSUED)
    }

    /// Sets or clears the issue instant.
    pub fn set_issued_utc(&mut self, value: Option<DateTime<Utc>>) {
        self.set_instant(slots::ISSUED, value);
    }

    /// The expiration instant.
    #[must_use]
    pub fn expires_utc(&self) -> Option<DateTime<Utc>> {
        self.get_instant(slots::EXPIRES)
    }

    /// Sets or clears the expiration instant.
    pub fn set_expires_utc(&mut self, value: Option<DateTime<Utc>>) {
        self.set_instant(slots::EXPIRES, value);
    }

    /// The client the ticket was issued to.
    #[must_use]
    pub fn client_id(&self) -> Option<&str> {
        self.get(slots::CLIENT_ID)
    }

    /// Sets the owning client.
    pub fn set_client_id(&mut self, value: impl Into<String>) {
        self.set(slots::CLIENT_ID, value);
    }

    /// The redirect URI bound to an authorization code.
    #[must_use]
    pub fn redirect_uri(&self) -> Option<&str> {
        self.get(slots::REDIRECT_URI)
    }

    /// Sets the bound redirect URI.
    pub fn set_redirect_uri(&mut self, value: impl Into<String>) {
        self.set(slots::REDIRECT_URI, value);
    }

    /// Consumes the bound redirect URI.
    pub fn take_redirect_uri(&mut self) -> Option<String> {
        self.remove(slots::REDIRECT_URI)
    }

    /// The space-separated resource list.
    #[must_use]
    pub fn resources(&self) -> BTreeSet<String> {
        split_values(self.get(slots::RESOURCE))
    }

    /// Sets the resource list.
    pub fn set_resource(&mut self, value: impl Into<String>) {
        self.set(slots::RESOURCE, value);
    }

    /// The space-separated scope list.
    #[must_use]
    pub fn scopes(&self) -> BTreeSet<String> {
        split_values(self.get(slots::SCOPE))
    }

    /// The raw scope value.
    #[must_use]
    pub fn scope(&self) -> Option<&str> {
        self.get(slots::SCOPE)
    }

    /// Sets the scope list.
    pub fn set_scope(&mut self, value: impl Into<String>) {
        self.set(slots::SCOPE, value);
    }

    /// The space-separated audience list.
    #[must_use]
    pub fn audiences(&self) -> BTreeSet<String> {
        split_values(self.get(slots::AUDIENCES))
    }

    /// Sets the audience list.
    pub fn set_audiences(&mut self, value: impl Into<String>) {
        self.set(slots::AUDIENCES, value);
    }

    fn get_instant(&self, key: &str) -> Option<DateTime<Utc>> {
        self.get(key)
            .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
            .map(|v| v.with_timezone(&Utc))
    }

    fn set_instant(&mut self, key: &str, value: Option<DateTime<Utc>>) {
        match value {
            Some(instant) => {
                self.set(key, instant.to_rfc3339_opts(SecondsFormat::Micros, true));
            }
            None => {
                self.entries.remove(key);
            }
        }
    }
}

/// Splits a space-separated property into a set.
fn split_values(value: Option<&str>) -> BTreeSet<String> {
    value
        .map(|v| v.split_whitespace().map(ToString::to_string).collect())
        .unwrap_or_default()
}

/// Default authentication scheme for tickets created by the pipelines.
pub const DEFAULT_SCHEME: &str = "oxidc";

/// A sign-in decision: principal, metadata and the scheme that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticationTicket {
    /// The authenticated identity.
    pub principal: Principal,

    /// Protocol metadata.
    pub properties: TicketProperties,

    /// Authentication scheme.
    pub scheme: String,
}

impl AuthenticationTicket {
    /// Creates a ticket with the default scheme.
    #[must_use]
    pub fn new(principal: Principal, properties: TicketProperties) -> Self {
        Self {
            principal,
            properties,
            scheme: DEFAULT_SCHEME.to_string(),
        }
    }

    /// Whether the ticket has expired (or never carried an expiration).
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.properties.expires_utc().is_none_or(|exp| exp <= now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample_principal() -> Principal {
        Principal::new()
            .with_claim(
                Claim::new(claims::SUB, "alice")
                    .with_destination(Destination::IdToken)
                    .with_destination(Destination::AccessToken),
            )
            .with_claim(Claim::new("email", "alice@example.com").with_destination(Destination::IdToken))
            .with_claim(Claim::new("secret_flag", "internal"))
    }

    #[test]
    fn filter_does_not_mutate_the_source() {
        let principal = sample_principal();
        let filtered = principal.filter(|c| c.allows(Destination::IdToken));

        assert_eq!(filtered.claims().count(), 2);
        assert_eq!(principal.claims().count(), 3);
    }

    #[test]
    fn subject_falls_back_to_name_identifier() {
        let principal = Principal::new().with_claim(Claim::new(claims::NAME_ID, "bob"));
        assert_eq!(principal.subject(), Some("bob"));

        let with_sub = sample_principal();
        assert_eq!(with_sub.subject(), Some("alice"));
    }

    #[test]
    fn instants_round_trip_through_properties() {
        let now = Utc::now();
        let mut props = TicketProperties::new();
        props.set_issued_utc(Some(now));
        props.set_expires_utc(Some(now + Duration::minutes(5)));

        let issued = props.issued_utc().unwrap();
        let expires = props.expires_utc().unwrap();
        assert!((issued - now).num_milliseconds().abs() < 1);
        assert!(issued <= expires);

        props.set_expires_utc(None);
        assert_eq!(props.expires_utc(), None);
    }

    #[test]
    fn space_separated_slots_split_into_sets() {
        let mut props = TicketProperties::new();
        props.set_scope("openid read write");
        props.set_resource("https://api.example.com");

        assert!(props.scopes().contains("read"));
        assert_eq!(props.scopes().len(), 3);
        assert_eq!(props.resources().len(), 1);
        assert!(props.audiences().is_empty());
    }

    #[test]
    fn ticket_without_expiration_counts_as_expired() {
        let ticket = AuthenticationTicket::new(sample_principal(), TicketProperties::new());
        assert!(ticket.is_expired(Utc::now()));
    }

    #[test]
    fn ticket_serde_round_trip() {
        let mut props = TicketProperties::new();
        props.set_client_id("c1");
        props.set_expires_utc(Some(Utc::now() + Duration::minutes(5)));
        let ticket = AuthenticationTicket::new(sample_principal(), props);

        let blob = serde_json::to_vec(&ticket).unwrap();
        let decoded: AuthenticationTicket = serde_json::from_slice(&blob).unwrap();
        assert_eq!(decoded, ticket);
    }
}
