//! The host extension surface.
//!
//! Every step of the pipelines that the host application can observe or
//! override is a method on [`ServerHooks`], with a no-op default. Hooks
//! receive a context struct they mutate in place: validation hooks resolve an
//! [`Outcome`], endpoint hooks may take over the response entirely, and the
//! token `create_*`/`receive_*` hooks may replace the built-in storage.
//!
//! A host implements only the hooks it cares about:
//!
//! ```rust,ignore
//! struct MyHooks;
//!
//! #[async_trait]
//! impl ServerHooks for MyHooks {
//!     async fn validate_client_redirect_uri(&self, ctx: &mut ClientRedirectUriContext) {
//!         if my_registry.allows(&ctx.client_id, ctx.redirect_uri.as_deref()) {
//!             ctx.outcome.validate();
//!         }
//!     }
//! }
//! ```

use async_trait::async_trait;
use axum::response::Response;
use oxidc_crypto::JsonWebKey;

use crate::endpoints::discovery::ProviderMetadata;
use crate::error::ErrorPayload;
use crate::message::OidcMessage;
use crate::ticket::{AuthenticationTicket, Principal, TicketProperties};

/// The endpoint classes the router dispatches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointKind {
    /// Authorization endpoint.
    Authorization,

    /// Token endpoint.
    Token,

    /// Validation (introspection) endpoint.
    Validation,

    /// Logout (end-session) endpoint.
    Logout,

    /// Configuration (discovery) endpoint.
    Configuration,

    /// Cryptography (JWKS) endpoint.
    Cryptography,
}

/// Resolution state of a validating hook.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Outcome {
    /// The hook made no decision; the pipeline applies its per-hook default.
    #[default]
    Untouched,

    /// The hook accepted the request.
    Validated,

    /// The hook rejected the request with a protocol error.
    Rejected(ErrorPayload),
}

impl Outcome {
    /// Marks the request as accepted.
    pub fn validate(&mut self) {
        *self = Self::Validated;
    }

    /// Rejects the request with an error code and description.
    pub fn reject(&mut self, error: impl Into<String>, description: impl Into<String>) {
        *self = Self::Rejected(ErrorPayload {
            error: error.into(),
            error_description: Some(description.into()),
            error_uri: None,
        });
    }

    /// Whether the request was accepted.
    #[must_use]
    pub fn is_validated(&self) -> bool {
        matches!(self, Self::Validated)
    }

    /// The rejection payload, if the hook rejected.
    #[must_use]
    pub fn rejection(&self) -> Option<&ErrorPayload> {
        match self {
            Self::Rejected(payload) => Some(payload),
            _ => None,
        }
    }
}

/// A sign-in decision produced by the host during authorization.
#[derive(Debug, Clone)]
pub struct SignIn {
    /// The authenticated identity.
    pub principal: Principal,

    /// Ticket metadata (expirations, scopes, resources, audiences).
    pub properties: TicketProperties,
}

/// Context of [`ServerHooks::match_endpoint`].
pub struct MatchEndpointContext {
    /// The request path.
    pub path: String,

    /// The endpoint the router classified, replaceable by the host.
    pub endpoint: Option<EndpointKind>,

    /// Set to terminate the request with this response.
    pub response: Option<Response>,

    /// Set to force the request to pass through untouched.
    pub skipped: bool,
}

/// Context of [`ServerHooks::validate_client_redirect_uri`].
#[derive(Debug)]
pub struct ClientRedirectUriContext {
    /// The authorization request.
    pub message: OidcMessage,

    /// The requesting client.
    pub client_id: String,

    /// The redirect URI under validation. The host may replace it, e.g. to
    /// apply a registered default when the request omitted one.
    pub redirect_uri: Option<String>,

    /// Validation outcome. Left untouched, the request is rejected.
    pub outcome: Outcome,
}

/// Context of [`ServerHooks::validate_client_logout_redirect_uri`].
#[derive(Debug)]
pub struct LogoutRedirectUriContext {
    /// The logout request.
    pub message: OidcMessage,

    /// The post-logout redirect URI under validation.
    pub post_logout_redirect_uri: String,

    /// Validation outcome. Left untouched, the request is rejected.
    pub outcome: Outcome,
}

/// Context of [`ServerHooks::validate_client_authentication`].
#[derive(Debug)]
pub struct ClientAuthenticationContext {
    /// The token request.
    pub message: OidcMessage,

    /// Client identifier, from the form or the `Authorization` header.
    pub client_id: Option<String>,

    /// Client secret, from the form or the `Authorization` header.
    pub client_secret: Option<String>,

    /// Validation outcome. Left untouched, the request is rejected.
    pub outcome: Outcome,
}

/// Context of [`ServerHooks::validate_authorization_request`].
#[derive(Debug)]
pub struct AuthorizationRequestContext {
    /// The fully reassembled authorization request.
    pub message: OidcMessage,

    /// Validation outcome. Left untouched, the request is rejected.
    pub outcome: Outcome,
}

/// Context of [`ServerHooks::validate_token_request`].
#[derive(Debug)]
pub struct TokenRequestContext {
    /// The token request.
    pub message: OidcMessage,

    /// The resolved ticket. The host may replace it.
    pub ticket: AuthenticationTicket,

    /// Validation outcome. Left untouched, the request proceeds (the ticket
    /// and client were already validated upstream).
    pub outcome: Outcome,
}

/// Context of [`ServerHooks::authorization_endpoint`].
pub struct AuthorizationEndpointContext {
    /// The validated authorization request.
    pub message: OidcMessage,

    /// A sign-in decision; setting one triggers response emission.
    pub sign_in: Option<SignIn>,

    /// Set to terminate the request with this response (e.g. a login page).
    pub response: Option<Response>,
}

impl AuthorizationEndpointContext {
    /// Records a sign-in decision.
    pub fn sign_in(&mut self, principal: Principal, properties: TicketProperties) {
        self.sign_in = Some(SignIn {
            principal,
            properties,
        });
    }
}

/// Context of [`ServerHooks::logout_endpoint`].
pub struct LogoutEndpointContext {
    /// The logout request.
    pub message: OidcMessage,

    /// Set when the host performed the sign-out; triggers response emission.
    pub signed_out: bool,

    /// Set to terminate the request with this response.
    pub response: Option<Response>,
}

impl LogoutEndpointContext {
    /// Records that the session was terminated.
    pub fn sign_out(&mut self) {
        self.signed_out = true;
    }
}

/// Context of [`ServerHooks::token_endpoint`].
pub struct TokenEndpointContext {
    /// The token request.
    pub message: OidcMessage,

    /// The granted ticket about to be serialized into tokens.
    pub ticket: AuthenticationTicket,

    /// Set to take over the response entirely.
    pub response: Option<Response>,
}

/// Context of [`ServerHooks::validation_endpoint`].
pub struct ValidationEndpointContext {
    /// The validation request.
    pub message: OidcMessage,

    /// Audiences of the resolved ticket.
    pub audiences: Vec<String>,

    /// Claims about to be disclosed, as `(type, value)` pairs. The host may
    /// redact or extend them.
    pub claims: Vec<(String, String)>,

    /// Set to take over the response entirely.
    pub response: Option<Response>,
}

/// Context of [`ServerHooks::configuration_endpoint`].
pub struct ConfigurationEndpointContext {
    /// The metadata document about to be served.
    pub metadata: ProviderMetadata,

    /// Set to take over the response entirely.
    pub response: Option<Response>,
}

/// Context of [`ServerHooks::cryptography_endpoint`].
pub struct CryptographyEndpointContext {
    /// The keys about to be served.
    pub keys: Vec<JsonWebKey>,

    /// Set to take over the response entirely.
    pub response: Option<Response>,
}

/// Context of the grant hooks.
///
/// For `authorization_code` and `refresh_token` the ticket arrives
/// pre-resolved and may be replaced. For `password`, `client_credentials`
/// and custom grants the host must attach a ticket and validate.
pub struct GrantContext {
    /// The token request.
    pub message: OidcMessage,

    /// The granted ticket.
    pub ticket: Option<AuthenticationTicket>,

    /// Grant outcome.
    pub outcome: Outcome,
}

/// Context of the `create_*` token hooks.
///
/// Setting `token` suppresses the built-in serialization.
pub struct CreateTokenContext {
    /// The request the token is issued for.
    pub request: OidcMessage,

    /// The ticket being serialized.
    pub ticket: AuthenticationTicket,

    /// The serialized token, when the host takes over issuance.
    pub token: Option<String>,
}

/// Context of the `receive_*` token hooks.
///
/// Setting `ticket` suppresses the built-in deserialization.
pub struct ReceiveTokenContext {
    /// The raw token received from the client.
    pub token: String,

    /// The resolved ticket, when the host takes over resolution.
    pub ticket: Option<AuthenticationTicket>,
}

/// Context of the message-response hooks.
pub struct ResponseContext {
    /// The response message about to be emitted.
    pub message: OidcMessage,

    /// Set to take over the response entirely.
    pub response: Option<Response>,
}

/// Context of the JSON-response hooks.
pub struct JsonResponseContext {
    /// The JSON payload about to be emitted.
    pub payload: serde_json::Value,

    /// Set to take over the response entirely.
    pub response: Option<Response>,
}

/// The notification surface of the authorization server.
///
/// Every method has a no-op default; implement only what the host needs.
/// The bare minimum for a functioning server is
/// [`validate_client_redirect_uri`](Self::validate_client_redirect_uri),
/// [`validate_authorization_request`](Self::validate_authorization_request),
/// [`validate_client_authentication`](Self::validate_client_authentication)
/// and [`authorization_endpoint`](Self::authorization_endpoint).
#[async_trait]
#[allow(unused_variables)]
pub trait ServerHooks: Send + Sync {
    /// Inspect or override the router's endpoint classification.
    async fn match_endpoint(&self, ctx: &mut MatchEndpointContext) {}

    /// Validate the `redirect_uri` of an authorization request against the
    /// client registration.
    async fn validate_client_redirect_uri(&self, ctx: &mut ClientRedirectUriContext) {}

    /// Validate the `post_logout_redirect_uri` of a logout request.
    async fn validate_client_logout_redirect_uri(&self, ctx: &mut LogoutRedirectUriContext) {}

    /// Authenticate the client of a token request.
    async fn validate_client_authentication(&self, ctx: &mut ClientAuthenticationContext) {}

    /// Validate the complete authorization request.
    async fn validate_authorization_request(&self, ctx: &mut AuthorizationRequestContext) {}

    /// Validate a token request after its ticket was resolved.
    async fn validate_token_request(&self, ctx: &mut TokenRequestContext) {}

    /// Obtain consent and identity for an authorization request.
    async fn authorization_endpoint(&self, ctx: &mut AuthorizationEndpointContext) {}

    /// Inspect or replace the authorization response before emission.
    async fn authorization_endpoint_response(&self, ctx: &mut ResponseContext) {}

    /// Perform the sign-out for a logout request.
    async fn logout_endpoint(&self, ctx: &mut LogoutEndpointContext) {}

    /// Inspect or replace the logout response before emission.
    async fn logout_endpoint_response(&self, ctx: &mut ResponseContext) {}

    /// Inspect or amend the discovery document.
    async fn configuration_endpoint(&self, ctx: &mut ConfigurationEndpointContext) {}

    /// Inspect or replace the discovery response before emission.
    async fn configuration_endpoint_response(&self, ctx: &mut JsonResponseContext) {}

    /// Inspect or amend the published key set.
    async fn cryptography_endpoint(&self, ctx: &mut CryptographyEndpointContext) {}

    /// Inspect or replace the JWKS response before emission.
    async fn cryptography_endpoint_response(&self, ctx: &mut JsonResponseContext) {}

    /// Inspect or replace the granted ticket before token issuance.
    async fn token_endpoint(&self, ctx: &mut TokenEndpointContext) {}

    /// Inspect or replace the token response before emission.
    async fn token_endpoint_response(&self, ctx: &mut ResponseContext) {}

    /// Inspect the resolved ticket of a validation request.
    async fn validation_endpoint(&self, ctx: &mut ValidationEndpointContext) {}

    /// Inspect or replace the validation response before emission.
    async fn validation_endpoint_response(&self, ctx: &mut JsonResponseContext) {}

    /// Approve an `authorization_code` grant.
    async fn grant_authorization_code(&self, ctx: &mut GrantContext) {}

    /// Approve a `refresh_token` grant.
    async fn grant_refresh_token(&self, ctx: &mut GrantContext) {}

    /// Handle a `password` grant. The host must attach a ticket.
    async fn grant_resource_owner_credentials(&self, ctx: &mut GrantContext) {}

    /// Handle a `client_credentials` grant. The host must attach a ticket.
    async fn grant_client_credentials(&self, ctx: &mut GrantContext) {}

    /// Handle a custom grant type. The host must attach a ticket.
    async fn grant_custom_extension(&self, ctx: &mut GrantContext) {}

    /// Serialize an authorization code, overriding the built-in storage.
    async fn create_authorization_code(&self, ctx: &mut CreateTokenContext) {}

    /// Serialize an access token, overriding the built-in JWT issuance.
    async fn create_access_token(&self, ctx: &mut CreateTokenContext) {}

    /// Serialize an identity token, overriding the built-in JWT issuance.
    async fn create_identity_token(&self, ctx: &mut CreateTokenContext) {}

    /// Serialize a refresh token, overriding the built-in storage.
    async fn create_refresh_token(&self, ctx: &mut CreateTokenContext) {}

    /// Resolve an authorization code, overriding the built-in storage.
    async fn receive_authorization_code(&self, ctx: &mut ReceiveTokenContext) {}

    /// Resolve an access token, overriding the built-in JWT validation.
    async fn receive_access_token(&self, ctx: &mut ReceiveTokenContext) {}

    /// Resolve an identity token, overriding the built-in JWT validation.
    async fn receive_identity_token(&self, ctx: &mut ReceiveTokenContext) {}

    /// Resolve a refresh token, overriding the built-in storage.
    async fn receive_refresh_token(&self, ctx: &mut ReceiveTokenContext) {}
}

/// A hooks implementation that accepts nothing.
///
/// Useful as a placeholder while wiring the server up; every request is
/// rejected at the first validation hook.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHooks;

impl ServerHooks for NoopHooks {}
