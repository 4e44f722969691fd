//! Storage trait definitions.

use crate::error::StorageResult;
use async_trait::async_trait;
use bytes::Bytes;

/// Blob store abstraction for paste bodies.
///
/// Failures are surfaced immediately and never retried inside the backend;
/// retry policy belongs to the caller.
#[async_trait]
pub trait BlobStore: std::fmt::Debug + Send + Sync + 'static {
    /// Check whether a blob exists.
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Get a blob's content. Fails with `NotFound` if absent.
    async fn get(&self, key: &str) -> StorageResult<Bytes>;

    /// Store a blob atomically, replacing any previous content.
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()>;

    /// Delete a blob. Deleting an absent key succeeds, so purge retries
    /// converge instead of erroring.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Get the name of this storage backend, for logging.
    fn backend_name(&self) -> &'static str;

    /// Verify backend connectivity.
    ///
    /// Called during startup so misconfiguration surfaces before the engine
    /// accepts work. The default implementation succeeds, suitable for
    /// backends with nothing to probe.
    async fn health_check(&self) -> StorageResult<()> {
        Ok(())
    }
}
