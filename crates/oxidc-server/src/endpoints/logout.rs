//! Logout (end-session) endpoint pipeline.
//!
//! Validates the `post_logout_redirect_uri` against the client registry,
//! lets the host perform the sign-out, and redirects back to the relying
//! party with the remaining request parameters.

use axum::extract::Request;
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::error::ProtocolError;
use crate::events::{
    LogoutEndpointContext, LogoutRedirectUriContext, ResponseContext, ServerHooks,
};
use crate::message::{OidcMessage, RequestKind, params};
use crate::types::ResponseMode;

use super::state::ServerState;
use super::{ReadResult, display_error, read_message, rebuild_request};

/// Handles a request classified as logout-endpoint traffic.
pub(super) async fn handle<H: ServerHooks + 'static>(
    state: ServerState<H>,
    request: Request,
    next: Next,
) -> Response {
    let parsed = match read_message(RequestKind::Logout, request, true).await {
        ReadResult::Parsed(parsed) => parsed,
        ReadResult::Failed {
            description,
            request,
        } => {
            let (parts, body) = request.into_parts();
            let body = axum::body::to_bytes(body, usize::MAX)
                .await
                .unwrap_or_default();
            let error = ProtocolError::InvalidRequest(description.to_string());
            return display_error(&state, parts, body, error.to_payload(), next).await;
        }
    };
    let (parts, body, message) = (parsed.parts, parsed.body, parsed.message);

    // The post-logout redirect target must be vetted by the host before it
    // is ever used, for the same open-redirect reason as redirect_uri.
    if let Some(target) = message.post_logout_redirect_uri().map(ToString::to_string) {
        let mut ctx = LogoutRedirectUriContext {
            message: message.clone(),
            post_logout_redirect_uri: target,
            outcome: Default::default(),
        };
        state
            .hooks()
            .validate_client_logout_redirect_uri(&mut ctx)
            .await;
        if !ctx.outcome.is_validated() {
            tracing::debug!("post_logout_redirect_uri validation failed");
            let payload = ctx.outcome.rejection().cloned().unwrap_or_else(|| {
                ProtocolError::InvalidClient(
                    "The specified post_logout_redirect_uri is invalid".to_string(),
                )
                .to_payload()
            });
            return display_error(&state, parts, body, payload, next).await;
        }
    }

    // The host performs the sign-out, renders its own confirmation UI, or
    // lets the request continue into the application.
    let mut ctx = LogoutEndpointContext {
        message: message.clone(),
        signed_out: false,
        response: None,
    };
    state.hooks().logout_endpoint(&mut ctx).await;

    if let Some(response) = ctx.response {
        return response;
    }
    if !ctx.signed_out {
        return next.run(rebuild_request(parts, body)).await;
    }

    apply_sign_out(&state, &message).await
}

/// Emits the logout response after the host signed the session out.
async fn apply_sign_out<H: ServerHooks + 'static>(
    state: &ServerState<H>,
    request: &OidcMessage,
) -> Response {
    let mut response = OidcMessage::new(RequestKind::Logout);
    if let Some(state_value) = request.state() {
        response.set(params::STATE, state_value);
    }

    let mut ctx = ResponseContext {
        message: response,
        response: None,
    };
    state.hooks().logout_endpoint_response(&mut ctx).await;
    if let Some(response) = ctx.response {
        return response;
    }

    // Redirect back to the relying party, carrying every response
    // parameter except the redirect target itself.
    if let Some(target) = request.post_logout_redirect_uri() {
        let mut message = ctx.message;
        message.remove(params::POST_LOGOUT_REDIRECT_URI);
        return message.to_response(target, ResponseMode::Query);
    }

    StatusCode::OK.into_response()
}
