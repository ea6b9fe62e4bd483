//! Authorization endpoint pipeline.
//!
//! Implements the request-validation state machine of RFC 6749 §4 and
//! `OpenID` Connect Core §3, the distributed request cache that lets an
//! authorization request survive the host's login round-trips, and the
//! response emission that turns a sign-in decision into codes and tokens.
//!
//! Failures before the redirect URI has been validated render the error
//! page; failures after it are reported to the client through an error
//! redirect in the request's response mode.

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use chrono::Duration;
use url::Url;

use crate::error::{ErrorPayload, ProtocolError};
use crate::events::{
    AuthorizationEndpointContext, AuthorizationRequestContext, ClientRedirectUriContext,
    ResponseContext, ServerHooks, SignIn,
};
use crate::message::{OidcMessage, RequestKind, params};
use crate::store;
use crate::ticket::AuthenticationTicket;
use crate::types::{ResponseMode, ResponseType, ResponseTypes};

use super::state::ServerState;
use super::{
    ReadResult, display_error, error_redirect, issuer, read_message, rebuild_request,
};

/// Handles a request classified as authorization-endpoint traffic.
pub(super) async fn handle<H: ServerHooks + 'static>(
    state: ServerState<H>,
    request: Request,
    next: Next,
) -> Response {
    // Parse: GET from the query, POST from a form body.
    let parsed = match read_message(RequestKind::Authentication, request, true).await {
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
    let (parts, body, mut message) = (parsed.parts, parsed.body, parsed.message);

    // Steps that must succeed before errors may be redirected: request
    // reassembly, client_id and redirect_uri policy, client validation.
    let redirect_uri = match resolve_redirect_uri(&state, &mut message).await {
        Ok(redirect_uri) => redirect_uri,
        Err(payload) => return display_error(&state, parts, body, payload, next).await,
    };

    // Full request validation; failures redirect when possible.
    let types = match validate_request(&state, &mut message).await {
        Ok(types) => types,
        Err(payload) => match redirect_uri.as_deref() {
            Some(uri) => return error_redirect(&message, uri, &payload),
            None => return display_error(&state, parts, body, payload, next).await,
        },
    };

    // Hand over to the host: it either renders its own response (login or
    // consent UI), produces a sign-in decision, or lets the request continue
    // into the application.
    let mut ctx = AuthorizationEndpointContext {
        message: message.clone(),
        sign_in: None,
        response: None,
    };
    state.hooks().authorization_endpoint(&mut ctx).await;

    if let Some(response) = ctx.response {
        if ctx.sign_in.is_some() {
            tracing::error!(
                "an authorization response was already produced; the sign-in decision \
                 cannot be applied and is ignored"
            );
        }
        return response;
    }

    if let Some(sign_in) = ctx.sign_in {
        let Some(redirect_uri) = redirect_uri else {
            let error = ProtocolError::ServerError(
                "A sign-in decision requires a validated redirect_uri".to_string(),
            );
            return display_error(&state, parts, body, error.to_payload(), next).await;
        };
        let issuer = issuer(&state, &parts);
        return apply_sign_in(&state, &message, &redirect_uri, &issuer, &types, sign_in).await;
    }

    next.run(rebuild_request(parts, body)).await
}

/// Reassembles a cached request and validates `client_id` and
/// `redirect_uri`. Failures here always render the error page.
async fn resolve_redirect_uri<H: ServerHooks>(
    state: &ServerState<H>,
    message: &mut OidcMessage,
) -> Result<Option<String>, ErrorPayload> {
    // Reassemble a previously cached request. Live parameters win on
    // collision so a stored blob cannot override what the user submitted.
    if let Some(unique_id) = message.unique_id().map(ToString::to_string) {
        let key = store::request_cache_key(&unique_id);
        let timeout =
            ProtocolError::InvalidRequest("Invalid request: timeout expired.".to_string());

        let blob = match state.cache().get(&key).await {
            Ok(Some(blob)) => blob,
            Ok(None) => return Err(timeout.to_payload()),
            Err(error) => {
                tracing::warn!(%error, "failed to read the cached authorization request");
                return Err(timeout.to_payload());
            }
        };

        match OidcMessage::from_blob(RequestKind::Authentication, &blob) {
            Ok(stored) => {
                for (key, value) in stored.iter() {
                    if !message.contains(key) {
                        message.set(key, value);
                    }
                }
            }
            Err(error) => {
                tracing::warn!(%error, "rejecting an incompatible cached authorization request");
                if let Err(error) = state.cache().remove(&key).await {
                    tracing::warn!(%error, "failed to remove the cached authorization request");
                }
                return Err(timeout.to_payload());
            }
        }
    }

    // client_id is required before anything else can be validated.
    let Some(client_id) = message.client_id().map(ToString::to_string) else {
        return Err(
            ProtocolError::InvalidRequest("client_id parameter missing".to_string()).to_payload(),
        );
    };

    // redirect_uri is mandatory for OpenID Connect requests.
    if message.redirect_uri().is_none() && message.has_scope("openid") {
        return Err(
            ProtocolError::InvalidRequest("redirect_uri parameter missing".to_string())
                .to_payload(),
        );
    }

    // Syntactic redirect_uri policy: absolute, fragment-free, and https
    // unless insecure HTTP was explicitly allowed.
    if let Some(raw) = message.redirect_uri() {
        let parsed = Url::parse(raw).map_err(|_| {
            ProtocolError::InvalidRequest("redirect_uri must be an absolute URI".to_string())
                .to_payload()
        })?;
        if parsed.fragment().is_some() {
            return Err(ProtocolError::InvalidRequest(
                "redirect_uri must not include a fragment".to_string(),
            )
            .to_payload());
        }
        if !state.options().allow_insecure_http && parsed.scheme() == "http" {
            return Err(ProtocolError::InvalidRequest(
                "redirect_uri must not use the unsafe http scheme".to_string(),
            )
            .to_payload());
        }
    }

    // The host validates the redirect_uri against its client registry. An
    // unvalidated redirect_uri is discarded before rendering the error so a
    // forged request can never turn the server into an open redirector.
    let mut ctx = ClientRedirectUriContext {
        message: message.clone(),
        client_id: client_id.clone(),
        redirect_uri: message.redirect_uri().map(ToString::to_string),
        outcome: Default::default(),
    };
    state.hooks().validate_client_redirect_uri(&mut ctx).await;
    if !ctx.outcome.is_validated() {
        tracing::debug!(%client_id, "client redirect_uri validation failed");
        return Err(ctx.outcome.rejection().cloned().unwrap_or_else(|| {
            ProtocolError::InvalidClient(
                "The specified client_id or redirect_uri is invalid".to_string(),
            )
            .to_payload()
        }));
    }

    if let Some(uri) = &ctx.redirect_uri {
        message.set(params::REDIRECT_URI, uri.clone());
    }
    Ok(ctx.redirect_uri)
}

/// Validates `response_type`, `response_mode`, `nonce` and the
/// cross-parameter consistency rules, fires the request-validation hook and
/// persists the request under a fresh `unique_id`.
async fn validate_request<H: ServerHooks>(
    state: &ServerState<H>,
    message: &mut OidcMessage,
) -> Result<ResponseTypes, ErrorPayload> {
    let has_openid = message.has_scope("openid");

    // response_type must name a recognized flow.
    let Some(raw_types) = message.response_type() else {
        return Err(
            ProtocolError::InvalidRequest("response_type parameter missing".to_string())
                .to_payload(),
        );
    };
    let types: ResponseTypes = raw_types.parse().map_err(|_| {
        ProtocolError::UnsupportedResponseType(
            "response_type contains an unsupported value".to_string(),
        )
        .to_payload()
    })?;
    if !types.is_recognized_flow() {
        return Err(ProtocolError::UnsupportedResponseType(
            "response_type does not describe a supported flow".to_string(),
        )
        .to_payload());
    }

    // response_mode membership, and the front-channel safety rule: tokens
    // must never travel in a query string.
    let mode = match message.response_mode() {
        Some(raw) => Some(raw.parse::<ResponseMode>().map_err(|_| {
            ProtocolError::InvalidRequest(
                "response_mode contains an unsupported value".to_string(),
            )
            .to_payload()
        })?),
        None => None,
    };
    if mode == Some(ResponseMode::Query)
        && (types.contains(ResponseType::Token) || types.contains(ResponseType::IdToken))
    {
        return Err(ProtocolError::InvalidRequest(
            "response_mode=query must not be used with a response_type containing id_token \
             or token"
                .to_string(),
        )
        .to_payload());
    }

    // nonce binds implicit and hybrid identity tokens to the request.
    if has_openid
        && (types.is_implicit_flow() || types.is_hybrid_flow())
        && message.nonce().is_none()
    {
        return Err(
            ProtocolError::InvalidRequest("nonce parameter missing".to_string()).to_payload(),
        );
    }

    // Cross-parameter consistency.
    if types.contains(ResponseType::IdToken) && !has_openid {
        return Err(ProtocolError::InvalidRequest(
            "the openid scope is mandatory when response_type contains id_token".to_string(),
        )
        .to_payload());
    }
    if types.contains(ResponseType::Code) && !state.options().token_endpoint_enabled() {
        return Err(ProtocolError::UnsupportedResponseType(
            "response_type=code requires the token endpoint to be enabled".to_string(),
        )
        .to_payload());
    }
    if types.contains(ResponseType::IdToken) && !state.credentials().is_configured() {
        return Err(ProtocolError::UnsupportedResponseType(
            "response_type=id_token requires signing credentials to be configured".to_string(),
        )
        .to_payload());
    }

    // The host validates the request as a whole.
    let mut ctx = AuthorizationRequestContext {
        message: message.clone(),
        outcome: Default::default(),
    };
    state.hooks().validate_authorization_request(&mut ctx).await;
    if !ctx.outcome.is_validated() {
        return Err(ctx.outcome.rejection().cloned().unwrap_or_else(|| {
            ProtocolError::InvalidRequest(
                "The authorization request was not validated".to_string(),
            )
            .to_payload()
        }));
    }

    // Persist the request so the host's login round-trips can reassemble it.
    if message.unique_id().is_none() {
        let unique_id = oxidc_crypto::random_key(state.options().entropy.as_ref());
        message.set(params::UNIQUE_ID, unique_id.clone());

        let expires = state.options().clock.now()
            + Duration::seconds(state.options().request_cache_lifetime);
        if let Err(error) = state
            .cache()
            .set(
                &store::request_cache_key(&unique_id),
                message.to_blob(),
                expires,
            )
            .await
        {
            tracing::warn!(%error, "failed to cache the authorization request");
            return Err(ProtocolError::ServerError(
                "The authorization request could not be persisted".to_string(),
            )
            .to_payload());
        }
    }

    Ok(types)
}

/// Emits the authorization response for a sign-in decision.
///
/// Each token kind named by `response_type` is issued independently, with a
/// fresh copy of the sign-in properties so one issuance step can never leak
/// lifetimes into another.
async fn apply_sign_in<H: ServerHooks + 'static>(
    state: &ServerState<H>,
    request: &OidcMessage,
    redirect_uri: &str,
    issuer: &str,
    types: &ResponseTypes,
    sign_in: SignIn,
) -> Response {
    let mut response = OidcMessage::new(RequestKind::Authentication);
    let server_error = || {
        ProtocolError::ServerError(
            "An internal error occurred while issuing the response".to_string(),
        )
        .to_payload()
    };

    if types.contains(ResponseType::Code) {
        // The code's lifetime is independent of the other tokens, so any
        // host-supplied instants are cleared before serialization. The
        // requesting client and redirect_uri are bound into the ticket;
        // redemption must present the exact same values.
        let mut properties = sign_in.properties.clone();
        properties.set_issued_utc(None);
        properties.set_expires_utc(None);
        if properties.redirect_uri().is_none() {
            if let Some(value) = request.redirect_uri() {
                properties.set_redirect_uri(value.to_string());
            }
        }
        if properties.client_id().is_none() {
            if let Some(value) = request.client_id() {
                properties.set_client_id(value.to_string());
            }
        }
        let ticket = AuthenticationTicket::new(sign_in.principal.clone(), properties);

        match store::create_authorization_code(state, request, ticket).await {
            Some(code) => response.set(params::CODE, code),
            None => return error_redirect(request, redirect_uri, &server_error()),
        }
    }

    if types.contains(ResponseType::IdToken) {
        let ticket =
            AuthenticationTicket::new(sign_in.principal.clone(), sign_in.properties.clone());

        match store::create_identity_token(state, request, &response, ticket, issuer, None).await {
            Some(id_token) => response.set(params::ID_TOKEN, id_token),
            None => return error_redirect(request, redirect_uri, &server_error()),
        }
    }

    if types.contains(ResponseType::Token) {
        let ticket =
            AuthenticationTicket::new(sign_in.principal.clone(), sign_in.properties.clone());

        match store::create_access_token(state, request, &response, ticket, issuer, None).await {
            Some((access_token, expires)) => {
                response.set(params::ACCESS_TOKEN, access_token);
                response.set(params::TOKEN_TYPE, "Bearer");
                let now = state.options().clock.now();
                if let Some(expires) = expires.filter(|expires| *expires > now) {
                    let seconds = (expires - now).num_milliseconds() as f64 / 1_000.0;
                    response.set(params::EXPIRES_IN, format!("{}", seconds.round() as i64));
                }
            }
            None => return error_redirect(request, redirect_uri, &server_error()),
        }
    }

    if let Some(state_value) = request.state() {
        response.set(params::STATE, state_value);
    }

    // The cached request is spent: a credential was bound to this sign-in.
    if let Some(unique_id) = request.unique_id() {
        if let Err(error) = state
            .cache()
            .remove(&store::request_cache_key(unique_id))
            .await
        {
            tracing::warn!(%error, "failed to remove the cached authorization request");
        }
    }

    let mut ctx = ResponseContext {
        message: response,
        response: None,
    };
    state.hooks().authorization_endpoint_response(&mut ctx).await;
    if let Some(response) = ctx.response {
        return response;
    }

    let mode = super::effective_response_mode(request);
    ctx.message.to_response(redirect_uri, mode)
}
