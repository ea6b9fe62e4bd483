//! Request classification and dispatch.
//!
//! The server mounts as an axum middleware: requests whose path matches a
//! configured endpoint are handled by the corresponding pipeline, everything
//! else passes through to the host application.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;

use crate::events::{EndpointKind, MatchEndpointContext, ServerHooks};

use super::state::ServerState;
use super::{authorization, discovery, introspection, logout, token};

/// The authorization-server middleware.
///
/// Mount with [`axum::middleware::from_fn_with_state`]:
///
/// ```rust,ignore
/// let app = Router::new()
///     .route("/", get(index))
///     .layer(middleware::from_fn_with_state(state.clone(), oidc_endpoints::<MyHooks>));
/// ```
pub async fn oidc_endpoints<H: ServerHooks + 'static>(
    State(state): State<ServerState<H>>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();

    let mut ctx = MatchEndpointContext {
        endpoint: classify(&state, &path),
        path,
        response: None,
        skipped: false,
    };
    state.hooks().match_endpoint(&mut ctx).await;

    if let Some(response) = ctx.response {
        return response;
    }
    if ctx.skipped {
        return next.run(request).await;
    }

    let Some(endpoint) = ctx.endpoint else {
        return next.run(request).await;
    };

    if !state.options().allow_insecure_http && !is_https(&request) {
        tracing::warn!(
            endpoint = ?endpoint,
            "ignoring endpoint request received over insecure HTTP"
        );
        return next.run(request).await;
    }

    tracing::debug!(endpoint = ?endpoint, path = %ctx.path, "dispatching endpoint request");

    match endpoint {
        EndpointKind::Authorization => authorization::handle(state, request, next).await,
        EndpointKind::Token => token::handle(state, request).await,
        EndpointKind::Validation => introspection::handle(state, request).await,
        EndpointKind::Logout => logout::handle(state, request, next).await,
        EndpointKind::Configuration => discovery::configuration(state, request).await,
        EndpointKind::Cryptography => discovery::cryptography(state, request).await,
    }
}

/// Classifies a request path by exact match against the configured paths.
fn classify<H: ServerHooks>(state: &ServerState<H>, path: &str) -> Option<EndpointKind> {
    let options = state.options();
    let matches = |configured: &Option<String>| configured.as_deref() == Some(path);

    if matches(&options.authorization_endpoint_path) {
        Some(EndpointKind::Authorization)
    } else if matches(&options.token_endpoint_path) {
        Some(EndpointKind::Token)
    } else if matches(&options.validation_endpoint_path) {
        Some(EndpointKind::Validation)
    } else if matches(&options.logout_endpoint_path) {
        Some(EndpointKind::Logout)
    } else if matches(&options.configuration_endpoint_path) {
        Some(EndpointKind::Configuration)
    } else if matches(&options.cryptography_endpoint_path) {
        Some(EndpointKind::Cryptography)
    } else {
        None
    }
}

/// Whether the request arrived over TLS, directly or behind a terminating
/// proxy advertising `x-forwarded-proto`.
fn is_https(request: &Request) -> bool {
    if request.uri().scheme_str() == Some("https") {
        return true;
    }

    request
        .headers()
        .get("x-forwarded-proto")
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.trim().eq_ignore_ascii_case("https"))
}
