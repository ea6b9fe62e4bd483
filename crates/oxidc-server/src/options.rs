//! Server configuration.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use oxidc_crypto::{Entropy, OsEntropy};

/// Time source for the pipelines.
///
/// Injected so tests can pin the clock instead of sleeping.
pub trait Clock: Send + Sync {
    /// The current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// System clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Configuration of the authorization server core.
///
/// An endpoint is enabled iff its path is set. Paths are matched exactly
/// against the request path, so include the full mount prefix.
#[derive(Clone)]
pub struct ServerOptions {
    /// Authorization endpoint path.
    pub authorization_endpoint_path: Option<String>,

    /// Token endpoint path.
    pub token_endpoint_path: Option<String>,

    /// Validation (introspection) endpoint path.
    pub validation_endpoint_path: Option<String>,

    /// Logout (end-session) endpoint path.
    pub logout_endpoint_path: Option<String>,

    /// Configuration (discovery) endpoint path.
    pub configuration_endpoint_path: Option<String>,

    /// Cryptography (JWKS) endpoint path.
    pub cryptography_endpoint_path: Option<String>,

    /// Issuer identifier. Computed from the request origin when unset.
    pub issuer: Option<String>,

    /// Permits `http` redirect URIs and plain-HTTP endpoint traffic.
    /// Never enable outside development.
    pub allow_insecure_http: bool,

    /// Lets the host application render protocol errors itself: errors that
    /// would produce the built-in error page pass through instead, with the
    /// error available as a request extension.
    pub application_can_display_errors: bool,

    /// Whether refreshed tokens may outlive the refresh token that produced
    /// them. When disabled, refreshed lifetimes are capped.
    pub use_sliding_expiration: bool,

    /// Authorization code lifetime, seconds.
    pub authorization_code_lifetime: i64,

    /// Access token lifetime, seconds.
    pub access_token_lifetime: i64,

    /// Identity token lifetime, seconds.
    pub identity_token_lifetime: i64,

    /// Refresh token lifetime, seconds.
    pub refresh_token_lifetime: i64,

    /// Cached authorization request lifetime, seconds.
    pub request_cache_lifetime: i64,

    /// Time source.
    pub clock: Arc<dyn Clock>,

    /// Randomness source for opaque keys.
    pub entropy: Arc<dyn Entropy>,
}

impl std::fmt::Debug for ServerOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerOptions")
            .field("authorization_endpoint_path", &self.authorization_endpoint_path)
            .field("token_endpoint_path", &self.token_endpoint_path)
            .field("validation_endpoint_path", &self.validation_endpoint_path)
            .field("logout_endpoint_path", &self.logout_endpoint_path)
            .field("configuration_endpoint_path", &self.configuration_endpoint_path)
            .field("cryptography_endpoint_path", &self.cryptography_endpoint_path)
            .field("issuer", &self.issuer)
            .field("allow_insecure_http", &self.allow_insecure_http)
            .field("use_sliding_expiration", &self.use_sliding_expiration)
            .finish_non_exhaustive()
    }
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            authorization_endpoint_path: Some("/connect/authorize".to_string()),
            token_endpoint_path: Some("/connect/token".to_string()),
            validation_endpoint_path: Some("/connect/introspect".to_string()),
            logout_endpoint_path: Some("/connect/logout".to_string()),
            configuration_endpoint_path: Some("/.well-known/openid-configuration".to_string()),
            cryptography_endpoint_path: Some("/.well-known/jwks".to_string()),
            issuer: None,
            allow_insecure_http: false,
            application_can_display_errors: false,
            use_sliding_expiration: true,
            authorization_code_lifetime: 300,
            access_token_lifetime: 3_600,
            identity_token_lifetime: 1_200,
            refresh_token_lifetime: 14 * 24 * 3_600,
            request_cache_lifetime: 3_600,
            clock: Arc::new(SystemClock),
            entropy: Arc::new(OsEntropy),
        }
    }
}

impl ServerOptions {
    /// Whether the token endpoint is enabled.
    #[must_use]
    pub const fn token_endpoint_enabled(&self) -> bool {
        self.token_endpoint_path.is_some()
    }

    /// Whether the authorization endpoint is enabled.
    #[must_use]
    pub const fn authorization_endpoint_enabled(&self) -> bool {
        self.authorization_endpoint_path.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_lifetimes_are_ordered_sensibly() {
        let options = ServerOptions::default();
        assert!(options.authorization_code_lifetime < options.access_token_lifetime);
        assert!(options.access_token_lifetime < options.refresh_token_lifetime);
        assert_eq!(options.request_cache_lifetime, 3_600);
    }

    #[test]
    fn endpoints_disable_by_clearing_the_path() {
        let mut options = ServerOptions::default();
        assert!(options.token_endpoint_enabled());
        options.token_endpoint_path = None;
        assert!(!options.token_endpoint_enabled());
    }

    #[test]
    fn insecure_http_is_off_by_default() {
        assert!(!ServerOptions::default().allow_insecure_http);
    }
}
