//! Ticket persistence and token construction.
//!
//! Authorization codes and refresh tokens are opaque 256-bit keys pointing
//! at serialized tickets in the blob cache; their claims are not filtered.
//! Access and identity tokens are RS256 JWTs carrying the subset of claims
//! whose destinations include the target kind.
//!
//! Every operation first offers itself to the corresponding host hook.
//! Internal failures are logged at warn level and surface as `None`, which
//! the pipelines translate into `invalid_grant` or `server_error`.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, Header, Validation, decode, encode};
use oxidc_crypto::{random_key, sha256};
use serde_json::{Map, Value, json};

use crate::endpoints::state::ServerState;
use crate::events::{CreateTokenContext, ReceiveTokenContext, ServerHooks};
use crate::message::OidcMessage;
use crate::ticket::{AuthenticationTicket, Claim, Destination, Principal, claims};

/// Cache key of a stored authorization request.
pub(crate) fn request_cache_key(unique_id: &str) -> String {
    format!("request:{unique_id}")
}

/// Cache key of a stored ticket (code or refresh token).
fn ticket_cache_key(token: &str) -> String {
    format!("ticket:{token}")
}

/// Computes a `c_hash`/`at_hash` claim value.
///
/// SHA-256 over the ASCII token, left half of the digest, standard base64
/// with padding stripped and URL-safe substitution. The unusual encoding is
/// wire-compatible with the servers this one replaces.
pub(crate) fn hash_claim(token: &str) -> String {
    let digest = sha256(token.as_bytes());
    let half = &digest[..digest.len() / 2];
    STANDARD
        .encode(half)
        .trim_end_matches('=')
        .replace('+', "-")
        .replace('/', "_")
}

/// Serializes and stores an authorization code ticket, returning the opaque
/// code.
pub(crate) async fn create_authorization_code<H: ServerHooks>(
    state: &ServerState<H>,
    request: &OidcMessage,
    ticket: AuthenticationTicket,
) -> Option<String> {
    let mut ctx = CreateTokenContext {
        request: request.clone(),
        ticket,
        token: None,
    };
    state.hooks().create_authorization_code(&mut ctx).await;
    if ctx.token.is_some() {
        return ctx.token;
    }

    store_opaque_ticket(
        state,
        ctx.ticket,
        state.options().authorization_code_lifetime,
        None,
        "authorization code",
    )
    .await
}

/// Serializes and stores a refresh token ticket, returning the opaque token.
pub(crate) async fn create_refresh_token<H: ServerHooks>(
    state: &ServerState<H>,
    request: &OidcMessage,
    ticket: AuthenticationTicket,
    expiration_cap: Option<DateTime<Utc>>,
) -> Option<String> {
    let mut ctx = CreateTokenContext {
        request: request.clone(),
        ticket,
        token: None,
    };
    state.hooks().create_refresh_token(&mut ctx).await;
    if ctx.token.is_some() {
        return ctx.token;
    }

    store_opaque_ticket(
        state,
        ctx.ticket,
        state.options().refresh_token_lifetime,
        expiration_cap,
        "refresh token",
    )
    .await
}

/// Issues an RS256 access token, returning the token and its expiration.
pub(crate) async fn create_access_token<H: ServerHooks>(
    state: &ServerState<H>,
    request: &OidcMessage,
    _response: &OidcMessage,
    ticket: AuthenticationTicket,
    issuer: &str,
    expiration_cap: Option<DateTime<Utc>>,
) -> Option<(String, Option<DateTime<Utc>>)> {
    let mut ctx = CreateTokenContext {
        request: request.clone(),
        ticket,
        token: None,
    };
    state.hooks().create_access_token(&mut ctx).await;
    if let Some(token) = ctx.token {
        return Some((token, ctx.ticket.properties.expires_utc()));
    }

    let mut ticket = ctx.ticket;
    let (issued, expires) = resolve_lifetime(
        state,
        &mut ticket,
        state.options().access_token_lifetime,
        expiration_cap,
    );

    // Keep only the claims destined for access tokens; the subject claims
    // always survive.
    let mut principal = ticket.principal.filter(|claim| {
        claim.allows(Destination::AccessToken)
            || claim.kind == claims::SUB
            || claim.kind == claims::NAME_ID
    });
    if principal.find(claims::SUB).is_none() {
        if let Some(name_id) = principal.find(claims::NAME_ID).map(|c| c.value.clone()) {
            principal.add_claim(Claim::new(claims::SUB, name_id));
        }
    }

    let request_resources: Vec<String> = request
        .resource()
        .map(|r| r.split_whitespace().map(ToString::to_string).collect())
        .unwrap_or_default();
    let audiences: Vec<String> = if request_resources.is_empty() {
        ticket.properties.resources().into_iter().collect()
    } else {
        request_resources
    };

    let mut payload = claims_payload(&principal);
    payload.insert(claims::ISS.to_string(), json!(issuer));
    insert_audience(&mut payload, &audiences);
    payload.insert(claims::IAT.to_string(), json!(issued.timestamp()));
    payload.insert(claims::EXP.to_string(), json!(expires.timestamp()));

    sign(state, payload, "access token").map(|token| (token, Some(expires)))
}

/// Issues an RS256 identity token.
pub(crate) async fn create_identity_token<H: ServerHooks>(
    state: &ServerState<H>,
    request: &OidcMessage,
    response: &OidcMessage,
    ticket: AuthenticationTicket,
    issuer: &str,
    expiration_cap: Option<DateTime<Utc>>,
) -> Option<String> {
    let mut ctx = CreateTokenContext {
        request: request.clone(),
        ticket,
        token: None,
    };
    state.hooks().create_identity_token(&mut ctx).await;
    if ctx.token.is_some() {
        return ctx.token;
    }

    let mut ticket = ctx.ticket;

    let Some(subject) = ticket.principal.subject().map(ToString::to_string) else {
        tracing::warn!("A unique identifier cannot be found to generate a 'sub' claim");
        return None;
    };

    let (issued, expires) = resolve_lifetime(
        state,
        &mut ticket,
        state.options().identity_token_lifetime,
        expiration_cap,
    );

    let principal = ticket.principal.filter(|claim| {
        claim.allows(Destination::IdToken)
            || claim.kind == claims::SUB
            || claim.kind == claims::NAME_ID
    });

    let audience = request
        .client_id()
        .or(ticket.properties.client_id())
        .map(ToString::to_string);

    let mut payload = claims_payload(&principal);
    payload.insert(claims::SUB.to_string(), json!(subject));
    payload.insert(claims::ISS.to_string(), json!(issuer));
    if let Some(audience) = audience {
        insert_audience(&mut payload, &[audience]);
    }
    payload.insert(claims::IAT.to_string(), json!(issued.timestamp()));
    payload.insert(claims::EXP.to_string(), json!(expires.timestamp()));

    if let Some(nonce) = request.nonce() {
        payload.insert(claims::NONCE.to_string(), json!(nonce));
    }
    if let Some(code) = response.code() {
        payload.insert(claims::C_HASH.to_string(), json!(hash_claim(code)));
    }
    if let Some(access_token) = response.access_token() {
        payload.insert(claims::AT_HASH.to_string(), json!(hash_claim(access_token)));
    }

    sign(state, payload, "identity token")
}

/// Resolves an authorization code. Codes are single-use: the entry is
/// removed before the ticket is handed back.
pub(crate) async fn receive_authorization_code<H: ServerHooks>(
    state: &ServerState<H>,
    token: &str,
) -> Option<AuthenticationTicket> {
    let mut ctx = ReceiveTokenContext {
        token: token.to_string(),
        ticket: None,
    };
    state.hooks().receive_authorization_code(&mut ctx).await;
    if ctx.ticket.is_some() {
        return ctx.ticket;
    }

    load_opaque_ticket(state, token, true, "authorization code").await
}

/// Resolves a refresh token. Refresh tokens stay stored until they expire.
pub(crate) async fn receive_refresh_token<H: ServerHooks>(
    state: &ServerState<H>,
    token: &str,
) -> Option<AuthenticationTicket> {
    let mut ctx = ReceiveTokenContext {
        token: token.to_string(),
        ticket: None,
    };
    state.hooks().receive_refresh_token(&mut ctx).await;
    if ctx.ticket.is_some() {
        return ctx.ticket;
    }

    load_opaque_ticket(state, token, false, "refresh token").await
}

/// Resolves an access token by validating its signature and rebuilding a
/// ticket from the JWT claims.
pub(crate) async fn receive_access_token<H: ServerHooks>(
    state: &ServerState<H>,
    token: &str,
) -> Option<AuthenticationTicket> {
    let mut ctx = ReceiveTokenContext {
        token: token.to_string(),
        ticket: None,
    };
    state.hooks().receive_access_token(&mut ctx).await;
    if ctx.ticket.is_some() {
        return ctx.ticket;
    }

    decode_jwt_ticket(state, token)
}

/// Resolves an identity token by validating its signature and rebuilding a
/// ticket from the JWT claims.
pub(crate) async fn receive_identity_token<H: ServerHooks>(
    state: &ServerState<H>,
    token: &str,
) -> Option<AuthenticationTicket> {
    let mut ctx = ReceiveTokenContext {
        token: token.to_string(),
        ticket: None,
    };
    state.hooks().receive_identity_token(&mut ctx).await;
    if ctx.ticket.is_some() {
        return ctx.ticket;
    }

    decode_jwt_ticket(state, token)
}

/// Defaults `issued`/`expires` and applies the refresh-expiration cap.
fn resolve_lifetime<H: ServerHooks>(
    state: &ServerState<H>,
    ticket: &mut AuthenticationTicket,
    lifetime: i64,
    expiration_cap: Option<DateTime<Utc>>,
) -> (DateTime<Utc>, DateTime<Utc>) {
    let now = state.options().clock.now();
    let issued = ticket.properties.issued_utc().unwrap_or(now);
    let mut expires = ticket
        .properties
        .expires_utc()
        .unwrap_or(issued + Duration::seconds(lifetime));
    if let Some(cap) = expiration_cap {
        if expires > cap {
            expires = cap;
        }
    }
    ticket.properties.set_issued_utc(Some(issued));
    ticket.properties.set_expires_utc(Some(expires));
    (issued, expires)
}

/// Stores a serialized ticket under a fresh opaque key.
async fn store_opaque_ticket<H: ServerHooks>(
    state: &ServerState<H>,
    mut ticket: AuthenticationTicket,
    lifetime: i64,
    expiration_cap: Option<DateTime<Utc>>,
    label: &str,
) -> Option<String> {
    let (_, expires) = resolve_lifetime(state, &mut ticket, lifetime, expiration_cap);

    let blob = match serde_json::to_vec(&ticket) {
        Ok(blob) => blob,
        Err(error) => {
            tracing::warn!(%error, "failed to serialize {label} ticket");
            return None;
        }
    };

    let key = random_key(state.options().entropy.as_ref());
    if let Err(error) = state
        .cache()
        .set(&ticket_cache_key(&key), blob, expires)
        .await
    {
        tracing::warn!(%error, "failed to store {label} ticket");
        return None;
    }

    Some(key)
}

/// Loads a serialized ticket, optionally consuming the entry.
async fn load_opaque_ticket<H: ServerHooks>(
    state: &ServerState<H>,
    token: &str,
    consume: bool,
    label: &str,
) -> Option<AuthenticationTicket> {
    let key = ticket_cache_key(token);
    let blob = match state.cache().get(&key).await {
        Ok(Some(blob)) => blob,
        Ok(None) => return None,
        Err(error) => {
            tracing::warn!(%error, "failed to read {label} ticket");
            return None;
        }
    };

    if consume {
        // Delete-before-use makes code redemption exactly-once: a replayed
        // code misses the cache and surfaces as invalid_grant.
        if let Err(error) = state.cache().remove(&key).await {
            tracing::warn!(%error, "failed to remove {label} ticket");
            return None;
        }
    }

    match serde_json::from_slice(&blob) {
        Ok(ticket) => Some(ticket),
        Err(error) => {
            tracing::warn!(%error, "failed to deserialize {label} ticket");
            None
        }
    }
}

/// Copies the principal's claims into a JWT payload map.
///
/// Registered claims are authoritative and inserted by the callers, so any
/// principal claim shadowing them is skipped. Repeated claim types collapse
/// into arrays.
fn claims_payload(principal: &Principal) -> Map<String, Value> {
    let mut payload = Map::new();
    for claim in principal.claims() {
        if matches!(
            claim.kind.as_str(),
            claims::ISS | claims::AUD | claims::IAT | claims::EXP | claims::SUB | claims::NAME_ID
        ) {
            continue;
        }
        match payload.get_mut(&claim.kind) {
            Some(Value::Array(values)) => values.push(json!(claim.value)),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, json!(claim.value)]);
            }
            None => {
                payload.insert(claim.kind.clone(), json!(claim.value));
            }
        }
    }

    // `sub` from the principal is re-inserted explicitly by the callers;
    // keep it when present so access tokens without a name identifier still
    // carry it.
    if let Some(subject) = principal.find(claims::SUB) {
        payload.insert(claims::SUB.to_string(), json!(subject.value));
    }

    payload
}

/// Inserts the `aud` claim, as a string for a single audience and an array
/// otherwise.
fn insert_audience(payload: &mut Map<String, Value>, audiences: &[String]) {
    match audiences {
        [] => {}
        [single] => {
            payload.insert(claims::AUD.to_string(), json!(single));
        }
        many => {
            payload.insert(claims::AUD.to_string(), json!(many));
        }
    }
}

/// Signs a JWT payload with the primary credential.
fn sign<H: ServerHooks>(
    state: &ServerState<H>,
    payload: Map<String, Value>,
    label: &str,
) -> Option<String> {
    let Some(credential) = state.credentials().primary() else {
        tracing::warn!("no signing credentials configured, cannot issue {label}");
        return None;
    };

    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(credential.kid().to_string());

    match encode(&header, &Value::Object(payload), credential.encoding_key()) {
        Ok(token) => Some(token),
        Err(error) => {
            tracing::warn!(%error, "failed to sign {label}");
            None
        }
    }
}

/// Validates a JWT against the configured credentials and rebuilds a ticket
/// from its claims.
///
/// Expiration is deliberately not enforced here: the pipelines check it so
/// expired tokens produce their specific error descriptions.
fn decode_jwt_ticket<H: ServerHooks>(
    state: &ServerState<H>,
    token: &str,
) -> Option<AuthenticationTicket> {
    let mut validation = Validation::new(Algorithm::RS256);
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    for credential in state.credentials().iter() {
        let Ok(data) = decode::<Value>(token, credential.decoding_key(), &validation) else {
            continue;
        };
        let Value::Object(payload) = data.claims else {
            tracing::warn!("token payload is not a JSON object");
            return None;
        };
        return Some(ticket_from_payload(&payload));
    }

    None
}

/// Rebuilds a ticket from a validated JWT payload.
fn ticket_from_payload(payload: &Map<String, Value>) -> AuthenticationTicket {
    let mut ticket = AuthenticationTicket::new(Principal::new(), Default::default());

    for (kind, value) in payload {
        match kind.as_str() {
            claims::ISS | claims::AUD | claims::IAT | claims::EXP => continue,
            claims::SCOPE => {
                if let Some(scope) = value.as_str() {
                    ticket.properties.set_scope(scope);
                }
            }
            _ => {}
        }

        let value = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        ticket.principal.add_claim(
            Claim::new(kind.clone(), value)
                .with_destination(Destination::AccessToken)
                .with_destination(Destination::IdToken),
        );
    }

    if let Some(issued) = payload
        .get(claims::IAT)
        .and_then(Value::as_i64)
        .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0))
    {
        ticket.properties.set_issued_utc(Some(issued));
    }
    if let Some(expires) = payload
        .get(claims::EXP)
        .and_then(Value::as_i64)
        .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0))
    {
        ticket.properties.set_expires_utc(Some(expires));
    }

    match payload.get(claims::AUD) {
        Some(Value::String(audience)) => ticket.properties.set_audiences(audience.clone()),
        Some(Value::Array(audiences)) => {
            let joined: Vec<&str> = audiences.iter().filter_map(Value::as_str).collect();
            ticket.properties.set_audiences(joined.join(" "));
        }
        _ => {}
    }

    ticket
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_claim_is_half_digest_base64() {
        // SHA-256("abc") =
        // ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad;
        // the left half base64-encoded is ungWv48Bz+pBQUDeXa4iIw==.
        assert_eq!(hash_claim("abc"), "ungWv48Bz-pBQUDeXa4iIw");
    }

    #[test]
    fn hash_claim_strips_padding_and_substitutes() {
        let value = hash_claim("some token value");
        assert!(!value.contains('='));
        assert!(!value.contains('+'));
        assert!(!value.contains('/'));
    }

    #[test]
    fn repeated_claims_collapse_into_arrays() {
        let principal = Principal::new()
            .with_claim(Claim::new("role", "admin").with_destination(Destination::AccessToken))
            .with_claim(Claim::new("role", "user").with_destination(Destination::AccessToken));

        let payload = claims_payload(&principal);
        assert_eq!(payload["role"], json!(["admin", "user"]));
    }

    #[test]
    fn single_audience_is_a_string() {
        let mut payload = Map::new();
        insert_audience(&mut payload, &["c1".to_string()]);
        assert_eq!(payload["aud"], json!("c1"));

        let mut payload = Map::new();
        insert_audience(&mut payload, &["a".to_string(), "b".to_string()]);
        assert_eq!(payload["aud"], json!(["a", "b"]));
    }

    #[test]
    fn ticket_from_payload_restores_metadata() {
        let payload = serde_json::from_value::<Map<String, Value>>(json!({
            "sub": "alice",
            "iss": "https://op.example.com",
            "aud": ["c1", "c2"],
            "iat": 1_700_000_000,
            "exp": 1_700_003_600,
            "scope": "openid read",
            "email": "alice@example.com",
        }))
        .unwrap();

        let ticket = ticket_from_payload(&payload);
        assert_eq!(ticket.principal.subject(), Some("alice"));
        assert!(ticket.properties.audiences().contains("c2"));
        assert!(ticket.properties.scopes().contains("read"));
        assert_eq!(
            ticket.properties.expires_utc().unwrap().timestamp(),
            1_700_003_600
        );
        assert!(ticket.principal.find("email").is_some());
        assert!(ticket.principal.find("iss").is_none());
    }
}
