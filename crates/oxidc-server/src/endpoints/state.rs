//! Shared state for the endpoint pipelines.

use std::sync::Arc;

use oxidc_cache::BlobCache;
use oxidc_crypto::SigningCredentials;

use crate::events::ServerHooks;
use crate::options::ServerOptions;

struct Inner<H> {
    options: ServerOptions,
    cache: Arc<dyn BlobCache>,
    credentials: SigningCredentials,
    hooks: H,
}

/// Shared, read-only state of the authorization server.
///
/// Cheap to clone; the configuration, signing credentials and hooks are
/// immutable after construction. Cross-request mutable state lives
/// exclusively in the [`BlobCache`].
pub struct ServerState<H> {
    inner: Arc<Inner<H>>,
}

impl<H> Clone for ServerState<H> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<H: ServerHooks> ServerState<H> {
    /// Creates the server state.
    pub fn new(
        options: ServerOptions,
        cache: Arc<dyn BlobCache>,
        credentials: SigningCredentials,
        hooks: H,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                options,
                cache,
                credentials,
                hooks,
            }),
        }
    }

    /// The server configuration.
    #[must_use]
    pub fn options(&self) -> &ServerOptions {
        &self.inner.options
    }

    /// The request/ticket cache.
    #[must_use]
    pub fn cache(&self) -> &dyn BlobCache {
        self.inner.cache.as_ref()
    }

    /// The configured signing credentials.
    #[must_use]
    pub fn credentials(&self) -> &SigningCredentials {
        &self.inner.credentials
    }

    /// The host hooks.
    #[must_use]
    pub fn hooks(&self) -> &H {
        &self.inner.hooks
    }
}
