//! Configuration (discovery) and cryptography (JWKS) endpoints.
//!
//! The metadata document follows `OpenID` Connect Discovery 1.0 and RFC
//! 8414; the advertised grant and response types are computed from which
//! endpoints and credentials are actually configured, so a relying party
//! never discovers a capability the server would later refuse.

use axum::extract::Request;
use axum::http::{Method, StatusCode};
use axum::response::Response;
use oxidc_crypto::JsonWebKeySet;
use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::events::{
    ConfigurationEndpointContext, CryptographyEndpointContext, JsonResponseContext, ServerHooks,
};

use super::state::ServerState;
use super::{issuer, json_error, json_response};

/// `OpenID` Provider Metadata, served by the configuration endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderMetadata {
    /// Issuer identifier.
    pub issuer: String,

    /// URL of the authorization endpoint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization_endpoint: Option<String>,

    /// URL of the token endpoint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_endpoint: Option<String>,

    /// URL of the validation (introspection) endpoint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub introspection_endpoint: Option<String>,

    /// URL of the end-session endpoint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_session_endpoint: Option<String>,

    /// URL of the JSON Web Key Set document.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwks_uri: Option<String>,

    /// Supported grant types.
    pub grant_types_supported: Vec<String>,

    /// Supported response modes.
    pub response_modes_supported: Vec<String>,

    /// Supported response types.
    pub response_types_supported: Vec<String>,

    /// Supported scopes.
    pub scopes_supported: Vec<String>,

    /// Supported subject identifier types.
    pub subject_types_supported: Vec<String>,

    /// Supported identity token signing algorithms.
    pub id_token_signing_alg_values_supported: Vec<String>,
}

/// Handles a request classified as configuration-endpoint traffic.
pub(super) async fn configuration<H: ServerHooks + 'static>(
    state: ServerState<H>,
    request: Request,
) -> Response {
    if request.method() != Method::GET {
        let error = ProtocolError::InvalidRequest(
            "The configuration endpoint only supports GET requests".to_string(),
        );
        return json_error(&error.to_payload());
    }

    let (parts, _) = request.into_parts();
    let metadata = build_metadata(&state, issuer(&state, &parts));

    let mut ctx = ConfigurationEndpointContext {
        metadata,
        response: None,
    };
    state.hooks().configuration_endpoint(&mut ctx).await;
    if let Some(response) = ctx.response {
        return response;
    }

    let payload = match serde_json::to_value(&ctx.metadata) {
        Ok(payload) => payload,
        Err(error) => {
            tracing::warn!(%error, "failed to serialize the provider metadata");
            let error = ProtocolError::ServerError(
                "An internal error occurred while preparing the metadata".to_string(),
            );
            return json_error(&error.to_payload());
        }
    };

    let mut ctx = JsonResponseContext {
        payload,
        response: None,
    };
    state.hooks().configuration_endpoint_response(&mut ctx).await;
    if let Some(response) = ctx.response {
        return response;
    }

    json_response(StatusCode::OK, &ctx.payload)
}

/// Handles a request classified as cryptography-endpoint traffic.
pub(super) async fn cryptography<H: ServerHooks + 'static>(
    state: ServerState<H>,
    request: Request,
) -> Response {
    if request.method() != Method::GET {
        let error = ProtocolError::InvalidRequest(
            "The cryptography endpoint only supports GET requests".to_string(),
        );
        return json_error(&error.to_payload());
    }

    let mut ctx = CryptographyEndpointContext {
        keys: state
            .credentials()
            .iter()
            .map(|credential| credential.to_jwk())
            .collect(),
        response: None,
    };
    state.hooks().cryptography_endpoint(&mut ctx).await;
    if let Some(response) = ctx.response {
        return response;
    }

    let key_set = JsonWebKeySet::with_keys(ctx.keys);
    let payload = match serde_json::to_value(&key_set) {
        Ok(payload) => payload,
        Err(error) => {
            tracing::warn!(%error, "failed to serialize the key set");
            let error = ProtocolError::ServerError(
                "An internal error occurred while preparing the key set".to_string(),
            );
            return json_error(&error.to_payload());
        }
    };

    let mut ctx = JsonResponseContext {
        payload,
        response: None,
    };
    state.hooks().cryptography_endpoint_response(&mut ctx).await;
    if let Some(response) = ctx.response {
        return response;
    }

    json_response(StatusCode::OK, &ctx.payload)
}

/// Computes the metadata document from the effective configuration.
fn build_metadata<H: ServerHooks>(state: &ServerState<H>, issuer: String) -> ProviderMetadata {
    let options = state.options();
    let absolute = |path: &Option<String>| path.as_ref().map(|path| format!("{issuer}{path}"));

    let authorization = options.authorization_endpoint_enabled();
    let token = options.token_endpoint_enabled();
    let signing = state.credentials().is_configured();

    let mut grant_types = Vec::new();
    if authorization && token {
        grant_types.push("authorization_code".to_string());
    }
    if authorization {
        grant_types.push("implicit".to_string());
    }
    if token {
        grant_types.push("refresh_token".to_string());
    }
    if token && !authorization {
        grant_types.push("password".to_string());
        grant_types.push("client_credentials".to_string());
    }

    let mut response_types = Vec::new();
    if authorization {
        response_types.push("none".to_string());
        response_types.push("token".to_string());
        if token {
            response_types.push("code".to_string());
            response_types.push("code token".to_string());
        }
        if signing {
            response_types.push("id_token".to_string());
            response_types.push("id_token token".to_string());
        }
        if token && signing {
            response_types.push("code id_token".to_string());
            response_types.push("code id_token token".to_string());
        }
    }

    ProviderMetadata {
        authorization_endpoint: absolute(&options.authorization_endpoint_path),
        token_endpoint: absolute(&options.token_endpoint_path),
        introspection_endpoint: absolute(&options.validation_endpoint_path),
        end_session_endpoint: absolute(&options.logout_endpoint_path),
        jwks_uri: absolute(&options.cryptography_endpoint_path),
        issuer,
        grant_types_supported: grant_types,
        response_modes_supported: vec![
            "query".to_string(),
            "fragment".to_string(),
            "form_post".to_string(),
        ],
        response_types_supported: response_types,
        scopes_supported: vec!["openid".to_string()],
        subject_types_supported: vec!["public".to_string()],
        id_token_signing_alg_values_supported: vec!["RS256".to_string()],
    }
}
