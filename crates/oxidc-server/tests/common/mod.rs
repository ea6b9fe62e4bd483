//! Shared helpers for the endpoint integration tests.
//!
//! The server is driven in-process through `tower::ServiceExt::oneshot`
//! against a router carrying the middleware, with a pass-through fallback so
//! tests can observe requests the server declined to handle.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use axum::middleware;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use http_body_util::BodyExt;
use tower::ServiceExt;

use oxidc_cache::MemoryCache;
use oxidc_crypto::{SigningCredential, SigningCredentials};
use oxidc_server::events::{
    AuthorizationEndpointContext, AuthorizationRequestContext, ClientAuthenticationContext,
    ClientRedirectUriContext, GrantContext, LogoutEndpointContext, LogoutRedirectUriContext,
};
use oxidc_server::ticket::{AuthenticationTicket, Claim, Destination, Principal, TicketProperties, claims};
use oxidc_server::{OidcMessage, ServerHooks, ServerOptions, ServerState, oidc_endpoints};

pub const TEST_CLIENT_ID: &str = "c1";
pub const TEST_CLIENT_SECRET: &str = "s3cr3t";
pub const TEST_REDIRECT_URI: &str = "https://rp/cb";
pub const TEST_LOGOUT_REDIRECT_URI: &str = "https://rp/out";
pub const TEST_ISSUER: &str = "https://op.example.com";

pub const PRIVATE_PEM: &[u8] = include_bytes!("../../testdata/rsa_private.pem");
pub const PUBLIC_PEM: &[u8] = include_bytes!("../../testdata/rsa_public.pem");

/// Hooks standing in for a host application with one registered client.
pub struct TestHooks {
    /// Whether the authorization endpoint immediately signs `alice` in.
    pub sign_in: bool,

    /// Every message seen by the authorization endpoint hook.
    pub seen: Arc<Mutex<Vec<OidcMessage>>>,
}

impl Default for TestHooks {
    fn default() -> Self {
        Self {
            sign_in: true,
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

/// The signed-in principal used across the tests: `sub` flows into both
/// token kinds, `email` only into identity tokens, `internal_note` into
/// neither.
pub fn alice() -> Principal {
    Principal::new()
        .with_claim(
            Claim::new(claims::SUB, "alice")
                .with_destination(Destination::IdToken)
                .with_destination(Destination::AccessToken),
        )
        .with_claim(Claim::new("email", "alice@example.com").with_destination(Destination::IdToken))
        .with_claim(Claim::new("internal_note", "do not disclose"))
}

#[async_trait]
impl ServerHooks for TestHooks {
    async fn validate_client_redirect_uri(&self, ctx: &mut ClientRedirectUriContext) {
        let uri_ok = ctx
            .redirect_uri
            .as_deref()
            .is_none_or(|uri| uri == TEST_REDIRECT_URI);
        if ctx.client_id == TEST_CLIENT_ID && uri_ok {
            ctx.outcome.validate();
        }
    }

    async fn validate_authorization_request(&self, ctx: &mut AuthorizationRequestContext) {
        ctx.outcome.validate();
    }

    async fn validate_client_authentication(&self, ctx: &mut ClientAuthenticationContext) {
        if ctx.client_id.as_deref() == Some(TEST_CLIENT_ID) {
            ctx.outcome.validate();
        }
    }

    async fn authorization_endpoint(&self, ctx: &mut AuthorizationEndpointContext) {
        self.seen.lock().unwrap().push(ctx.message.clone());

        if self.sign_in {
            let mut properties = TicketProperties::new();
            if let Some(scope) = ctx.message.scope() {
                properties.set_scope(scope.to_string());
            }
            ctx.sign_in(alice(), properties);
        }
    }

    async fn grant_resource_owner_credentials(&self, ctx: &mut GrantContext) {
        if ctx.message.get("username") == Some("bob")
            && ctx.message.get("password") == Some("hunter2")
        {
            let principal = Principal::new().with_claim(
                Claim::new(claims::SUB, "bob")
                    .with_destination(Destination::IdToken)
                    .with_destination(Destination::AccessToken),
            );
            let mut properties = TicketProperties::new();
            properties.set_scope("openid read");
            ctx.ticket = Some(AuthenticationTicket::new(principal, properties));
            ctx.outcome.validate();
        }
    }

    async fn validate_client_logout_redirect_uri(&self, ctx: &mut LogoutRedirectUriContext) {
        if ctx.post_logout_redirect_uri == TEST_LOGOUT_REDIRECT_URI {
            ctx.outcome.validate();
        }
    }

    async fn logout_endpoint(&self, ctx: &mut LogoutEndpointContext) {
        ctx.sign_out();
    }
}

/// Options matching the scenario endpoints (`/auth`, `/token`, `/validate`,
/// `/logout`), with insecure HTTP allowed so the in-process requests are
/// dispatched.
pub fn test_options() -> ServerOptions {
    ServerOptions {
        authorization_endpoint_path: Some("/auth".to_string()),
        token_endpoint_path: Some("/token".to_string()),
        validation_endpoint_path: Some("/validate".to_string()),
        logout_endpoint_path: Some("/logout".to_string()),
        issuer: Some(TEST_ISSUER.to_string()),
        allow_insecure_http: true,
        ..ServerOptions::default()
    }
}

/// The RSA credentials used for issuance in tests.
pub fn test_credentials() -> SigningCredentials {
    let credential = SigningCredential::from_rsa_pem(PRIVATE_PEM, PUBLIC_PEM)
        .expect("the bundled test key must load");
    std::iter::once(credential).collect()
}

/// Builds the application: the middleware in front of a pass-through marker.
pub fn build_app(options: ServerOptions, credentials: SigningCredentials, hooks: TestHooks) -> Router {
    let state = ServerState::new(options, Arc::new(MemoryCache::new()), credentials, hooks);

    Router::new()
        .fallback(|| async { (StatusCode::NOT_FOUND, "passthrough") })
        .layer(middleware::from_fn_with_state(
            state,
            oidc_endpoints::<TestHooks>,
        ))
}

/// Builds the default application used by most tests.
pub fn default_app() -> Router {
    build_app(test_options(), test_credentials(), TestHooks::default())
}

/// Sends a GET request.
pub async fn get(app: &Router, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.clone().oneshot(request).await.unwrap()
}

/// Sends a POST request with a form body.
pub async fn post_form(app: &Router, uri: &str, body: &str) -> Response<Body> {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("Content-Type", "application/x-www-form-urlencoded")
        .body(Body::from(body.to_string()))
        .unwrap();
    app.clone().oneshot(request).await.unwrap()
}

/// The `Location` header of a redirect response.
pub fn location(response: &Response<Body>) -> String {
    response
        .headers()
        .get("location")
        .expect("expected a Location header")
        .to_str()
        .unwrap()
        .to_string()
}

/// Collects a response body as JSON.
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).expect("expected a JSON body")
}

/// Collects a response body as text.
pub async fn body_text(response: Response<Body>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Decodes a JWT payload without verifying the signature.
pub fn decode_jwt_payload(token: &str) -> serde_json::Value {
    let parts: Vec<&str> = token.split('.').collect();
    assert_eq!(parts.len(), 3, "expected a compact JWT");
    let payload = URL_SAFE_NO_PAD.decode(parts[1]).unwrap();
    serde_json::from_slice(&payload).unwrap()
}

/// Parses the parameters after the given separator of a redirect target.
pub fn response_params(url: &str, separator: char) -> std::collections::HashMap<String, String> {
    let (_, raw) = url
        .split_once(separator)
        .unwrap_or_else(|| panic!("no '{separator}' in {url}"));
    serde_urlencoded::from_str::<Vec<(String, String)>>(raw)
        .unwrap()
        .into_iter()
        .collect()
}

/// Signs an access-token-shaped JWT directly, for reception tests.
pub fn signed_jwt(claims: &serde_json::Value) -> String {
    let key = jsonwebtoken::EncodingKey::from_rsa_pem(PRIVATE_PEM).unwrap();
    let header = jsonwebtoken::Header::new(jsonwebtoken::Algorithm::RS256);
    jsonwebtoken::encode(&header, claims, &key).unwrap()
}
