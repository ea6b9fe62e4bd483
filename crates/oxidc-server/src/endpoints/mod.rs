//! Endpoint pipelines.
//!
//! Each submodule implements one endpoint class; [`router`] classifies
//! incoming requests and dispatches. Shared request parsing and response
//! helpers live here.

pub mod authorization;
pub mod discovery;
pub mod introspection;
pub mod logout;
pub mod router;
pub mod state;
pub mod token;

use axum::body::{Body, Bytes};
use axum::extract::Request;
use axum::http::request::Parts;
use axum::http::{Method, StatusCode, header};
use axum::middleware::Next;
use axum::response::{Html, IntoResponse, Response};

use crate::error::ErrorPayload;
use crate::message::{OidcMessage, RequestKind, html_escape};
use crate::types::{ResponseMode, ResponseType, ResponseTypes};

use self::state::ServerState;

/// A request whose parameters were decoded into a message.
///
/// The original parts and body are kept so the request can be rebuilt and
/// passed through to the host application.
pub(crate) struct ParsedRequest {
    pub parts: Parts,
    pub body: Bytes,
    pub message: OidcMessage,
}

/// Rebuilds a request from its saved parts for pass-through.
pub(crate) fn rebuild_request(parts: Parts, body: Bytes) -> Request {
    Request::from_parts(parts, Body::from(body))
}

/// Result of [`read_message`].
pub(crate) enum ReadResult {
    /// The request was decoded.
    Parsed(ParsedRequest),

    /// The request violates the endpoint's HTTP contract. The original
    /// request is preserved for error pass-through.
    Failed {
        description: &'static str,
        request: Request,
    },
}

/// Decodes an endpoint request into an [`OidcMessage`].
///
/// GET requests are read from the query string; POST requests require an
/// `application/x-www-form-urlencoded` content type (case-insensitive,
/// parameters after `;` tolerated) and are read from the form body.
pub(crate) async fn read_message(
    kind: RequestKind,
    request: Request,
    allow_get: bool,
) -> ReadResult {
    match request.method().clone() {
        Method::GET if allow_get => {
            let (parts, body) = request.into_parts();
            let query = parts.uri.query().unwrap_or("");
            let pairs: Vec<(String, String)> =
                serde_urlencoded::from_str(query).unwrap_or_default();
            let bytes = read_body(body).await.unwrap_or_default();
            ReadResult::Parsed(ParsedRequest {
                parts,
                body: bytes,
                message: OidcMessage::from_pairs(kind, pairs),
            })
        }
        Method::POST => {
            if !has_form_content_type(&request) {
                return ReadResult::Failed {
                    description:
                        "A malformed request has been received: the mandatory \
                         'Content-Type' header was missing or invalid.",
                    request,
                };
            }

            let (parts, body) = request.into_parts();
            let Some(bytes) = read_body(body).await else {
                return ReadResult::Failed {
                    description: "A malformed request has been received: the request body \
                                  could not be read.",
                    request: Request::from_parts(parts, Body::empty()),
                };
            };

            let pairs: Vec<(String, String)> =
                serde_urlencoded::from_bytes(&bytes).unwrap_or_default();
            ReadResult::Parsed(ParsedRequest {
                parts,
                body: bytes,
                message: OidcMessage::from_pairs(kind, pairs),
            })
        }
        _ => ReadResult::Failed {
            description: "A malformed request has been received: the request method is not \
                          supported by this endpoint.",
            request,
        },
    }
}

async fn read_body(body: Body) -> Option<Bytes> {
    axum::body::to_bytes(body, usize::MAX).await.ok()
}

/// Whether the request declares a form-urlencoded body.
fn has_form_content_type(request: &Request) -> bool {
    request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .is_some_and(|value| {
            value
                .trim()
                .eq_ignore_ascii_case("application/x-www-form-urlencoded")
        })
}

/// Computes the issuer: the configured value, else the request origin.
pub(crate) fn issuer<H>(state: &ServerState<H>, parts: &Parts) -> String
where
    H: crate::events::ServerHooks,
{
    if let Some(issuer) = &state.options().issuer {
        return issuer.trim_end_matches('/').to_string();
    }

    let scheme = parts
        .uri
        .scheme_str()
        .map(ToString::to_string)
        .or_else(|| forwarded_proto(parts))
        .unwrap_or_else(|| "http".to_string());

    let authority = parts
        .uri
        .authority()
        .map(ToString::to_string)
        .or_else(|| {
            parts
                .headers
                .get(header::HOST)
                .and_then(|value| value.to_str().ok())
                .map(ToString::to_string)
        })
        .unwrap_or_else(|| "localhost".to_string());

    format!("{scheme}://{authority}")
}

fn forwarded_proto(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get("x-forwarded-proto")
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_ascii_lowercase())
}

/// The response mode errors and responses are delivered in: the explicit
/// `response_mode` when it parses, else the flow default (fragment for
/// flows carrying tokens in the front channel, query otherwise).
pub(crate) fn effective_response_mode(message: &OidcMessage) -> ResponseMode {
    if let Some(mode) = message.response_mode() {
        if let Ok(mode) = mode.parse() {
            return mode;
        }
    }

    let types: ResponseTypes = message
        .response_type()
        .and_then(|value| value.parse().ok())
        .unwrap_or_default();

    if types.contains(ResponseType::Token) || types.contains(ResponseType::IdToken) {
        ResponseMode::Fragment
    } else {
        ResponseMode::Query
    }
}

/// Emits an error through a redirect in the request's response mode.
pub(crate) fn error_redirect(
    request: &OidcMessage,
    redirect_uri: &str,
    payload: &ErrorPayload,
) -> Response {
    let mut response = OidcMessage::new(request.kind());
    response.set(crate::message::params::ERROR, payload.error.clone());
    if let Some(description) = &payload.error_description {
        response.set(crate::message::params::ERROR_DESCRIPTION, description.clone());
    }
    if let Some(uri) = &payload.error_uri {
        response.set(crate::message::params::ERROR_URI, uri.clone());
    }
    if let Some(state) = request.state() {
        response.set(crate::message::params::STATE, state);
    }

    response.to_response(redirect_uri, effective_response_mode(request))
}

/// Renders the built-in HTML error page, or passes the request through when
/// the host application displays protocol errors itself.
pub(crate) async fn display_error<H>(
    state: &ServerState<H>,
    parts: Parts,
    body: Bytes,
    payload: ErrorPayload,
    next: Next,
) -> Response
where
    H: crate::events::ServerHooks,
{
    if state.options().application_can_display_errors {
        let mut request = rebuild_request(parts, body);
        request.extensions_mut().insert(payload);
        return next.run(request).await;
    }

    error_page(&payload)
}

/// The built-in HTML error page.
pub(crate) fn error_page(payload: &ErrorPayload) -> Response {
    let html = format!(
        r"<!DOCTYPE html>
<html>
<head><title>Error</title></head>
<body>
<h1>An error occurred</h1>
<p><strong>Error:</strong> {}</p>
<p><strong>Description:</strong> {}</p>
</body>
</html>",
        html_escape(&payload.error),
        html_escape(payload.error_description.as_deref().unwrap_or("")),
    );

    (StatusCode::BAD_REQUEST, Html(html)).into_response()
}

/// Serializes a JSON payload with the cache-defeating headers mandated for
/// token responses.
pub(crate) fn json_response(status: StatusCode, value: &serde_json::Value) -> Response {
    (
        status,
        [
            (header::CACHE_CONTROL, "no-cache"),
            (header::PRAGMA, "no-cache"),
            (header::EXPIRES, "-1"),
            (header::CONTENT_TYPE, "application/json;charset=UTF-8"),
        ],
        value.to_string(),
    )
        .into_response()
}

/// Serializes an error payload as a JSON 400 response.
pub(crate) fn json_error(payload: &ErrorPayload) -> Response {
    let value = serde_json::to_value(payload).unwrap_or_default();
    json_response(StatusCode::BAD_REQUEST, &value)
}
