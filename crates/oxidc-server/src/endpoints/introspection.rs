//! Validation (introspection) endpoint pipeline.
//!
//! Accepts exactly one of `token`, `id_token` or `refresh_token`, resolves
//! it into a ticket and discloses its audiences, remaining lifetime and
//! claims to the caller.

use axum::extract::Request;
use axum::http::StatusCode;
use axum::response::Response;
use serde_json::json;

use crate::error::ProtocolError;
use crate::events::{JsonResponseContext, ServerHooks, ValidationEndpointContext};
use crate::message::{OidcMessage, RequestKind, params};
use crate::store;
use crate::ticket::AuthenticationTicket;

use super::state::ServerState;
use super::{ReadResult, json_error, json_response, read_message};

/// The token kinds the endpoint can introspect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenKind {
    Access,
    Identity,
    Refresh,
}

impl TokenKind {
    const fn label(self) -> &'static str {
        match self {
            Self::Access => "access token",
            Self::Identity => "identity token",
            Self::Refresh => "refresh token",
        }
    }
}

/// Handles a request classified as validation-endpoint traffic.
pub(super) async fn handle<H: ServerHooks + 'static>(
    state: ServerState<H>,
    request: Request,
) -> Response {
    let parsed = match read_message(RequestKind::Token, request, true).await {
        ReadResult::Parsed(parsed) => parsed,
        ReadResult::Failed { description, .. } => {
            let error = ProtocolError::InvalidRequest(description.to_string());
            return json_error(&error.to_payload());
        }
    };
    let message = parsed.message;

    // Exactly one token parameter must be present, or the response could
    // disclose claims for a token the caller never proved possession of.
    let mut provided: Vec<(TokenKind, &str)> = Vec::new();
    if let Some(token) = message.token() {
        provided.push((TokenKind::Access, token));
    }
    if let Some(token) = message.id_token() {
        provided.push((TokenKind::Identity, token));
    }
    if let Some(token) = message.refresh_token() {
        provided.push((TokenKind::Refresh, token));
    }
    let &[(kind, token)] = &provided[..] else {
        let error = ProtocolError::InvalidRequest(
            "Exactly one of the token, id_token and refresh_token parameters must be provided"
                .to_string(),
        );
        return json_error(&error.to_payload());
    };

    let ticket = match kind {
        TokenKind::Access => store::receive_access_token(&state, token).await,
        TokenKind::Identity => store::receive_identity_token(&state, token).await,
        TokenKind::Refresh => store::receive_refresh_token(&state, token).await,
    };
    let Some(ticket) = ticket else {
        let error = ProtocolError::InvalidGrant(format!("Invalid {} received", kind.label()));
        return json_error(&error.to_payload());
    };

    let now = state.options().clock.now();
    if ticket.is_expired(now) {
        let error = ProtocolError::InvalidGrant(format!("Expired {} received", kind.label()));
        return json_error(&error.to_payload());
    }

    // When both sides name audiences, the caller may only ask about a
    // subset of what the ticket was issued for.
    if let Some(error) = check_audiences(&message, &ticket) {
        return json_error(&error.to_payload());
    }

    let mut ctx = ValidationEndpointContext {
        message: message.clone(),
        audiences: ticket.properties.audiences().into_iter().collect(),
        claims: ticket
            .principal
            .claims()
            .map(|claim| (claim.kind.clone(), claim.value.clone()))
            .collect(),
        response: None,
    };
    state.hooks().validation_endpoint(&mut ctx).await;
    if let Some(response) = ctx.response {
        return response;
    }

    let expires_in = ticket
        .properties
        .expires_utc()
        .map(|expires| (expires - now).num_seconds());

    let payload = json!({
        "audiences": ctx.audiences,
        "expires_in": expires_in,
        "claims": ctx
            .claims
            .iter()
            .map(|(kind, value)| json!({ "type": kind, "value": value }))
            .collect::<Vec<_>>(),
    });

    let mut ctx = JsonResponseContext {
        payload,
        response: None,
    };
    state.hooks().validation_endpoint_response(&mut ctx).await;
    if let Some(response) = ctx.response {
        return response;
    }

    json_response(StatusCode::OK, &ctx.payload)
}

/// Rejects requests asking about audiences the ticket was not issued for.
fn check_audiences(message: &OidcMessage, ticket: &AuthenticationTicket) -> Option<ProtocolError> {
    let granted = ticket.properties.audiences();
    let requested: std::collections::BTreeSet<String> = message
        .get(params::AUDIENCE)
        .map(|value| value.split_whitespace().map(ToString::to_string).collect())
        .unwrap_or_default();

    if granted.is_empty() || requested.is_empty() {
        return None;
    }
    if requested.is_subset(&granted) {
        return None;
    }

    Some(ProtocolError::InvalidGrant(
        "The audience parameter exceeds the set granted to the ticket".to_string(),
    ))
}
