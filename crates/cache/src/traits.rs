//! Cache trait and entry types.

use crate::error::CacheResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use time::OffsetDateTime;
use uuid::Uuid;

/// Cache key: a paste id at a specific version.
///
/// Including the version means an update naturally misses on the old entry
/// without depending on invalidation timing; the service still invalidates
/// explicitly after each mutation to bound staleness.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub paste_id: Uuid,
    pub version: i64,
}

impl CacheKey {
    /// Create a key for a paste at a version.
    pub fn new(paste_id: Uuid, version: i64) -> Self {
        Self { paste_id, version }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.paste_id, self.version)
    }
}

/// A cached paste read: decompressed content plus the metadata needed to
/// serve the read without touching blob storage.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheEntry {
    pub title: String,
    pub content_language: String,
    pub content: String,
    pub size_bytes: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub updated_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub expires_at: Option<OffsetDateTime>,
}

/// Read cache over paste content.
#[async_trait]
pub trait PasteCache: std::fmt::Debug + Send + Sync + 'static {
    /// Look up an entry; expired entries behave as absent.
    async fn get(&self, key: &CacheKey) -> CacheResult<Option<CacheEntry>>;

    /// Store an entry with the given TTL.
    async fn put(&self, key: &CacheKey, entry: CacheEntry, ttl: Duration) -> CacheResult<()>;

    /// Drop an entry if present.
    async fn invalidate(&self, key: &CacheKey) -> CacheResult<()>;

    /// Get the name of this cache backend, for logging.
    fn backend_name(&self) -> &'static str;
}
