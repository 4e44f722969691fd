//! Distributed per-paste locking for the snip paste engine.
//!
//! This crate provides:
//! - The `LockManager` trait: acquire-with-timeout, fenced release
//! - `Lease` with a bounded lifetime and fencing token
//! - `LeaseGuard`, releasing on every exit path
//! - Variants: advisory lock files and a shared PostgreSQL table
//! - A `from_config` factory selecting the variant once at startup

pub mod error;
pub mod file;
pub mod lease;
pub mod shared;

pub use error::{LockError, LockResult};
pub use file::FileLockManager;
pub use lease::{Lease, LeaseGuard, LockManager};
pub use shared::SharedLockManager;

use snip_core::config::LockConfig;
use std::sync::Arc;
use std::time::Duration;

/// Create a lock manager from configuration.
pub async fn from_config(config: &LockConfig) -> LockResult<Arc<dyn LockManager>> {
    config.validate().map_err(LockError::Config)?;

    match config {
        LockConfig::Filesystem {
            dir,
            lease_ttl_secs,
            retry_interval_ms,
        } => {
            let manager = FileLockManager::new(
                dir,
                Duration::from_secs(*lease_ttl_secs),
                Duration::from_millis(*retry_interval_ms),
            )
            .await?;
            Ok(Arc::new(manager))
        }
        LockConfig::Shared {
            url,
            max_connections,
            lease_ttl_secs,
            retry_interval_ms,
        } => {
            tracing::info!("Connecting to shared lock store");
            let manager = SharedLockManager::new(
                url,
                *max_connections,
                Duration::from_secs(*lease_ttl_secs),
                Duration::from_millis(*retry_interval_ms),
            )
            .await?;
            Ok(Arc::new(manager))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn from_config_filesystem_ok() {
        let temp = tempdir().unwrap();
        let config = LockConfig::Filesystem {
            dir: temp.path().join("locks"),
            lease_ttl_secs: 30,
            retry_interval_ms: 50,
        };

        let locks = from_config(&config).await.unwrap();
        let lease = locks
            .acquire("a", Duration::from_millis(100))
            .await
            .unwrap();
        locks.release(&lease).await.unwrap();
    }

    #[tokio::test]
    async fn lease_guard_releases_on_drop() {
        let temp = tempdir().unwrap();
        let config = LockConfig::Filesystem {
            dir: temp.path().join("locks"),
            lease_ttl_secs: 30,
            retry_interval_ms: 10,
        };
        let locks = from_config(&config).await.unwrap();

        {
            let lease = locks
                .acquire("a", Duration::from_millis(100))
                .await
                .unwrap();
            let _guard = LeaseGuard::new(locks.clone(), lease);
            // Guard dropped here without explicit release.
        }

        // The drop-spawned release runs shortly after; the key must become
        // acquirable well before the lease TTL.
        let lease = locks.acquire("a", Duration::from_secs(1)).await.unwrap();
        locks.release(&lease).await.unwrap();
    }
}
