//! The blob cache trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::CacheResult;

/// Key-value store for opaque blobs with absolute expiration.
///
/// Implementations must be safe for concurrent access. The only consistency
/// guarantee the server relies on is last-write-wins per key and
/// read-your-write from a single origin; authorization codes are removed
/// before use, so a lost write surfaces as `invalid_grant` rather than a
/// replay.
#[async_trait]
pub trait BlobCache: Send + Sync {
    /// Gets a blob, or `None` if the key is absent or expired.
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>>;

    /// Stores a blob until `expires` (absolute).
    async fn set(&self, key: &str, value: Vec<u8>, expires: DateTime<Utc>) -> CacheResult<()>;

    /// Removes a blob. Removing an absent key is not an error.
    async fn remove(&self, key: &str) -> CacheResult<()>;
}
