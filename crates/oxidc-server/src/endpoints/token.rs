//! Token endpoint pipeline.
//!
//! Implements POST `/token` for the `authorization_code`, `refresh_token`,
//! `password` and `client_credentials` grants, plus host-defined extension
//! grants. Responses are JSON with the cache-defeating headers of RFC 6749
//! §5.1; failures are JSON errors with status 400.

use std::collections::BTreeSet;

use axum::extract::Request;
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::Response;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value, json};

use crate::error::ProtocolError;
use crate::events::{
    ClientAuthenticationContext, GrantContext, ResponseContext, ServerHooks, TokenEndpointContext,
    TokenRequestContext,
};
use crate::message::{OidcMessage, RequestKind, params};
use crate::store;
use crate::ticket::AuthenticationTicket;
use crate::types::GrantKind;

use super::state::ServerState;
use super::{ReadResult, issuer, json_error, json_response, read_message};

/// Handles a request classified as token-endpoint traffic.
pub(super) async fn handle<H: ServerHooks + 'static>(
    state: ServerState<H>,
    request: Request,
) -> Response {
    let parsed = match read_message(RequestKind::Token, request, false).await {
        ReadResult::Parsed(parsed) => parsed,
        ReadResult::Failed { description, .. } => {
            let error = ProtocolError::InvalidRequest(description.to_string());
            return json_error(&error.to_payload());
        }
    };
    let (parts, mut message) = (parsed.parts, parsed.message);

    // Client authentication: form credentials first, then the Basic header.
    if message.client_id().is_none() && message.client_secret().is_none() {
        if let Some((client_id, client_secret)) = basic_credentials(&parts) {
            message.set(params::CLIENT_ID, client_id);
            if let Some(client_secret) = client_secret {
                message.set(params::CLIENT_SECRET, client_secret);
            }
        }
    }

    let mut ctx = ClientAuthenticationContext {
        message: message.clone(),
        client_id: message.client_id().map(ToString::to_string),
        client_secret: message.client_secret().map(ToString::to_string),
        outcome: Default::default(),
    };
    state.hooks().validate_client_authentication(&mut ctx).await;
    if !ctx.outcome.is_validated() {
        tracing::debug!("client authentication failed");
        let payload = ctx.outcome.rejection().cloned().unwrap_or_else(|| {
            ProtocolError::InvalidClient("Client authentication failed".to_string()).to_payload()
        });
        return json_error(&payload);
    }
    // The hook may have normalized the client identity.
    if let Some(client_id) = ctx.client_id {
        message.set(params::CLIENT_ID, client_id);
    }

    let Some(grant_type) = message.grant_type() else {
        let error =
            ProtocolError::UnsupportedGrantType("grant_type parameter missing".to_string());
        return json_error(&error.to_payload());
    };
    let grant = GrantKind::parse(grant_type);

    let granted = match grant {
        GrantKind::AuthorizationCode | GrantKind::RefreshToken => {
            resolve_stored_grant(&state, &message, &grant).await
        }
        GrantKind::Password | GrantKind::ClientCredentials | GrantKind::Custom(_) => {
            resolve_direct_grant(&state, &message, &grant).await
        }
    };
    let granted = match granted {
        Ok(granted) => granted,
        Err(response) => return response,
    };

    issue(&state, &parts, &message, &grant, granted).await
}

/// Extracts `client_id`/`client_secret` from a Basic `Authorization` header.
fn basic_credentials(parts: &Parts) -> Option<(String, Option<String>)> {
    let header = parts
        .headers
        .get(axum::http::header::AUTHORIZATION)?
        .to_str()
        .ok()?;
    let encoded = header.strip_prefix("Basic ")?;
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let credentials = String::from_utf8(decoded).ok()?;
    let (client_id, client_secret) = credentials.split_once(':')?;
    Some((client_id.to_string(), Some(client_secret.to_string())))
}

/// A granted ticket, with the expiration it carried when it was resolved
/// (used to cap refreshed lifetimes).
struct Granted {
    ticket: AuthenticationTicket,
    original_expires: Option<DateTime<Utc>>,
}

/// Resolves and checks the stored ticket of an `authorization_code` or
/// `refresh_token` grant.
async fn resolve_stored_grant<H: ServerHooks>(
    state: &ServerState<H>,
    message: &OidcMessage,
    grant: &GrantKind,
) -> Result<Granted, Response> {
    let is_code = matches!(grant, GrantKind::AuthorizationCode);

    let token = if is_code {
        message.code().ok_or_else(|| {
            json_error(
                &ProtocolError::InvalidRequest("code parameter missing".to_string()).to_payload(),
            )
        })?
    } else {
        message.refresh_token().ok_or_else(|| {
            json_error(
                &ProtocolError::InvalidRequest("refresh_token parameter missing".to_string())
                    .to_payload(),
            )
        })?
    };

    let mut ticket = if is_code {
        store::receive_authorization_code(state, token).await
    } else {
        store::receive_refresh_token(state, token).await
    }
    .ok_or_else(|| {
        json_error(&ProtocolError::InvalidGrant("Invalid ticket".to_string()).to_payload())
    })?;

    let now = state.options().clock.now();
    if ticket.is_expired(now) {
        return Err(json_error(
            &ProtocolError::InvalidGrant("Expired".to_string()).to_payload(),
        ));
    }
    let original_expires = ticket.properties.expires_utc();

    // A code bound to a redirect_uri may only be redeemed with the exact
    // same value; the binding is consumed on redemption.
    if is_code {
        if let Some(stored) = ticket.properties.redirect_uri().map(ToString::to_string) {
            if message.redirect_uri() != Some(stored.as_str()) {
                return Err(json_error(
                    &ProtocolError::InvalidGrant(
                        "The redirect_uri parameter does not match the one bound to the \
                         authorization code"
                            .to_string(),
                    )
                    .to_payload(),
                ));
            }
            ticket.properties.take_redirect_uri();
        }
    }

    // A ticket bound to a client may not be redeemed by another one.
    if let Some(stored) = ticket.properties.client_id().map(ToString::to_string) {
        let supplied = message.client_id();
        let mismatch = if is_code {
            supplied != Some(stored.as_str())
        } else {
            supplied.is_some_and(|value| value != stored)
        };
        if mismatch {
            return Err(json_error(
                &ProtocolError::InvalidGrant(
                    "The ticket was not issued to this client".to_string(),
                )
                .to_payload(),
            ));
        }
    }

    // Requested resources and scopes may narrow the granted set, never
    // extend it.
    if let Some(requested) = message.resource() {
        check_subset(requested, &ticket.properties.resources(), "resource")?;
    }
    if let Some(requested) = message.scope() {
        check_subset(requested, &ticket.properties.scopes(), "scope")?;
    }

    let pre_issued = ticket.properties.issued_utc();
    let pre_expires = ticket.properties.expires_utc();

    let mut ctx = TokenRequestContext {
        message: message.clone(),
        ticket,
        outcome: Default::default(),
    };
    state.hooks().validate_token_request(&mut ctx).await;
    if let Some(payload) = ctx.outcome.rejection() {
        return Err(json_error(&payload.clone()));
    }

    let mut grant_ctx = GrantContext {
        message: message.clone(),
        ticket: Some(ctx.ticket),
        outcome: Default::default(),
    };
    if is_code {
        state.hooks().grant_authorization_code(&mut grant_ctx).await;
    } else {
        state.hooks().grant_refresh_token(&mut grant_ctx).await;
    }
    if let Some(payload) = grant_ctx.outcome.rejection() {
        return Err(json_error(&payload.clone()));
    }
    let mut ticket = grant_ctx.ticket.ok_or_else(|| {
        json_error(&ProtocolError::InvalidGrant("Invalid ticket".to_string()).to_payload())
    })?;

    // Unless a hook chose new instants, the fresh tokens get lifetimes of
    // their own instead of inheriting the code's or refresh token's.
    if ticket.properties.issued_utc() == pre_issued
        && ticket.properties.expires_utc() == pre_expires
    {
        ticket.properties.set_issued_utc(None);
        ticket.properties.set_expires_utc(None);
    }

    Ok(Granted {
        ticket,
        original_expires,
    })
}

/// Rejects a request whose `requested` values are not a subset of the
/// `granted` set.
fn check_subset(
    requested: &str,
    granted: &BTreeSet<String>,
    parameter: &str,
) -> Result<(), Response> {
    let requested: BTreeSet<String> = requested
        .split_whitespace()
        .map(ToString::to_string)
        .collect();

    if granted.is_empty() || !requested.is_subset(granted) {
        return Err(json_error(
            &ProtocolError::InvalidGrant(format!(
                "The {parameter} parameter exceeds the set granted to the ticket"
            ))
            .to_payload(),
        ));
    }
    Ok(())
}

/// Runs the grant hook of a `password`, `client_credentials` or custom
/// grant; the host must attach and validate a ticket.
async fn resolve_direct_grant<H: ServerHooks>(
    state: &ServerState<H>,
    message: &OidcMessage,
    grant: &GrantKind,
) -> Result<Granted, Response> {
    let mut ctx = GrantContext {
        message: message.clone(),
        ticket: None,
        outcome: Default::default(),
    };
    match grant {
        GrantKind::Password => {
            state
                .hooks()
                .grant_resource_owner_credentials(&mut ctx)
                .await;
        }
        GrantKind::ClientCredentials => state.hooks().grant_client_credentials(&mut ctx).await,
        _ => state.hooks().grant_custom_extension(&mut ctx).await,
    }

    if let Some(payload) = ctx.outcome.rejection() {
        return Err(json_error(&payload.clone()));
    }

    let default_error = match grant {
        GrantKind::Password => ProtocolError::InvalidGrant(
            "The resource owner credentials were not validated".to_string(),
        ),
        GrantKind::ClientCredentials => ProtocolError::UnauthorizedClient(
            "The client_credentials grant was not validated".to_string(),
        ),
        _ => ProtocolError::UnsupportedGrantType(
            "The specified grant_type is not supported".to_string(),
        ),
    };

    if !ctx.outcome.is_validated() {
        return Err(json_error(&default_error.to_payload()));
    }
    let ticket = ctx
        .ticket
        .ok_or_else(|| json_error(&default_error.to_payload()))?;

    Ok(Granted {
        ticket,
        original_expires: None,
    })
}

/// Issues the tokens of a granted request and emits the JSON response.
async fn issue<H: ServerHooks + 'static>(
    state: &ServerState<H>,
    parts: &Parts,
    message: &OidcMessage,
    grant: &GrantKind,
    granted: Granted,
) -> Response {
    let mut ctx = TokenEndpointContext {
        message: message.clone(),
        ticket: granted.ticket,
        response: None,
    };
    state.hooks().token_endpoint(&mut ctx).await;
    if let Some(response) = ctx.response {
        return response;
    }
    let mut ticket = ctx.ticket;

    // Propagate the request's identity and narrowing back into the ticket
    // so the next refresh compares against what was actually granted.
    if let Some(client_id) = message.client_id() {
        ticket.properties.set_client_id(client_id.to_string());
    }
    if let Some(resource) = message.resource() {
        ticket.properties.set_resource(resource.to_string());
    }
    if let Some(scope) = message.scope() {
        ticket.properties.set_scope(scope.to_string());
    }

    // Without sliding expiration, refreshed tokens never outlive the
    // refresh token that produced them.
    let cap = if matches!(grant, GrantKind::RefreshToken) && !state.options().use_sliding_expiration
    {
        granted.original_expires
    } else {
        None
    };

    let issuer = issuer(state, parts);
    let response_type = message.response_type();
    let include = |kind: &str| {
        response_type.is_none_or(|value| value.split_whitespace().any(|part| part == kind))
    };

    let mut response = OidcMessage::new(RequestKind::Token);

    if include(params::ID_TOKEN) {
        let copy = AuthenticationTicket::new(ticket.principal.clone(), ticket.properties.clone());
        match store::create_identity_token(state, message, &response, copy, &issuer, cap).await {
            Some(id_token) => response.set(params::ID_TOKEN, id_token),
            None => {
                let openid_requested = message.has_scope("openid")
                    || ticket.properties.scopes().contains("openid");
                if openid_requested {
                    let error = ProtocolError::ServerError(
                        "An internal error occurred while issuing the identity token".to_string(),
                    );
                    return json_error(&error.to_payload());
                }
            }
        }
    }

    if include(params::TOKEN) {
        let copy = AuthenticationTicket::new(ticket.principal.clone(), ticket.properties.clone());
        match store::create_access_token(state, message, &response, copy, &issuer, cap).await {
            Some((access_token, expires)) => {
                response.set(params::ACCESS_TOKEN, access_token);
                response.set(params::TOKEN_TYPE, "Bearer");
                let now = state.options().clock.now();
                if let Some(expires) = expires.filter(|expires| *expires > now) {
                    let seconds = (expires - now).num_milliseconds() as f64 / 1_000.0;
                    response.set(params::EXPIRES_IN, format!("{}", seconds.round() as i64));
                }
            }
            None => {
                let error = ProtocolError::ServerError(
                    "An internal error occurred while issuing the access token".to_string(),
                );
                return json_error(&error.to_payload());
            }
        }
    }

    if include(params::REFRESH_TOKEN) {
        let copy = AuthenticationTicket::new(ticket.principal.clone(), ticket.properties.clone());
        if let Some(refresh_token) = store::create_refresh_token(state, message, copy, cap).await {
            response.set(params::REFRESH_TOKEN, refresh_token);
        }
    }

    if let Some(scope) = ticket.properties.scope() {
        response.set(params::SCOPE, scope.to_string());
    }

    let mut ctx = ResponseContext {
        message: response,
        response: None,
    };
    state.hooks().token_endpoint_response(&mut ctx).await;
    if let Some(response) = ctx.response {
        return response;
    }

    json_response(StatusCode::OK, &payload_from_message(&ctx.message))
}

/// Serializes a response message into a JSON object. `expires_in` is the
/// only numeric member; everything else stays a string.
fn payload_from_message(message: &OidcMessage) -> Value {
    let mut payload = Map::new();
    for (key, value) in message.iter() {
        if key == params::EXPIRES_IN {
            if let Ok(seconds) = value.parse::<i64>() {
                payload.insert(key.to_string(), json!(seconds));
                continue;
            }
        }
        payload.insert(key.to_string(), json!(value));
    }
    Value::Object(payload)
}
