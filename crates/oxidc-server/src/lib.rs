//! # oxidc-server
//!
//! An embeddable `OpenID` Connect 1.0 / OAuth 2.0 authorization server core.
//!
//! The server mounts as an axum middleware that owns up to six endpoints
//! (authorization, token, validation, logout, configuration, cryptography)
//! and passes every other request through to the host application. The host
//! plugs in through [`events::ServerHooks`]: it validates clients, obtains
//! user consent, and produces sign-in decisions; the pipelines enforce the
//! protocol and issue the credentials.
//!
//! ```rust,ignore
//! let state = ServerState::new(
//!     ServerOptions::default(),
//!     Arc::new(MemoryCache::new()),
//!     credentials,
//!     MyHooks,
//! );
//!
//! let app = Router::new()
//!     .route("/login", get(login_page))
//!     .layer(middleware::from_fn_with_state(state, oidc_endpoints::<MyHooks>));
//! ```

#![forbid(unsafe_code)]

pub mod endpoints;
pub mod error;
pub mod events;
pub mod message;
pub mod options;
mod store;
pub mod ticket;
pub mod types;

pub use endpoints::router::oidc_endpoints;
pub use endpoints::state::ServerState;
pub use error::{ErrorPayload, ProtocolError};
pub use events::{EndpointKind, Outcome, ServerHooks, SignIn};
pub use message::{OidcMessage, RequestKind};
pub use options::{Clock, ServerOptions, SystemClock};
pub use ticket::{AuthenticationTicket, Claim, Destination, Principal, TicketProperties};
pub use types::{GrantKind, ResponseMode, ResponseType, ResponseTypes};
