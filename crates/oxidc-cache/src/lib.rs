//! # oxidc-cache
//!
//! Blob cache abstraction backing the authorization server's cross-request
//! state: cached authorization requests, authorization codes and refresh
//! tokens. Entries are opaque byte blobs with an absolute expiration.
//!
//! Production deployments plug in a distributed store; [`MemoryCache`] is the
//! single-process default and the test double.

#![forbid(unsafe_code)]

mod error;
mod memory;
mod store;

pub use error::{CacheError, CacheResult};
pub use memory::MemoryCache;
pub use store::BlobCache;
