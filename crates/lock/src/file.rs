//! Filesystem-based advisory locking.

use crate::error::{LockError, LockResult};
use crate::lease::{poll_acquire, Lease, LockManager};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use time::OffsetDateTime;
use tracing::instrument;
use uuid::Uuid;

/// On-disk lease payload.
#[derive(Debug, Serialize, Deserialize)]
struct LeaseFile {
    fencing_token: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    expires_at: OffsetDateTime,
}

/// Advisory lock files on a local or shared filesystem.
///
/// A lock is a file created with `create_new`, holding the lease's fencing
/// token and expiry. A contender that finds the recorded expiry in the past
/// steals the lock by unlinking and re-creating the file; release verifies
/// the fencing token first, so a holder that lost its lease to a steal
/// cannot unlink the new holder's file.
pub struct FileLockManager {
    dir: PathBuf,
    lease_ttl: Duration,
    retry_interval: Duration,
}

impl FileLockManager {
    /// Create a new file lock manager storing lock files under `dir`.
    pub async fn new(
        dir: impl AsRef<Path>,
        lease_ttl: Duration,
        retry_interval: Duration,
    ) -> LockResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            lease_ttl,
            retry_interval,
        })
    }

    fn lock_path(&self, key: &str) -> LockResult<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !valid {
            return Err(LockError::Config(format!("invalid lock key: {key}")));
        }
        Ok(self.dir.join(format!("{key}.lock")))
    }

    /// One acquisition attempt: create the lock file, or steal it if the
    /// recorded lease has lapsed.
    async fn try_acquire_once(&self, key: &str, path: &Path) -> LockResult<Option<Lease>> {
        let now = OffsetDateTime::now_utc();
        let lease = Lease {
            key: key.to_string(),
            fencing_token: Uuid::new_v4(),
            expires_at: now + self.lease_ttl,
        };
        let payload = serde_json::to_vec(&LeaseFile {
            fencing_token: lease.fencing_token,
            expires_at: lease.expires_at,
        })?;

        match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await
        {
            Ok(file) => {
                use tokio::io::AsyncWriteExt;
                let mut file = file;
                file.write_all(&payload).await?;
                file.sync_all().await?;
                tracing::debug!(key, "Lock acquired");
                Ok(Some(lease))
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                if self.holder_is_stale(path, now).await? {
                    tracing::info!(key, "Stealing stale lock");
                    match tokio::fs::remove_file(path).await {
                        Ok(()) => {}
                        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                        Err(e) => return Err(LockError::Io(e)),
                    }
                }
                Ok(None)
            }
            Err(e) => Err(LockError::Io(e)),
        }
    }

    /// Whether the lock file at `path` records a lapsed lease.
    ///
    /// An unreadable or unparsable file counts as stale only once its mtime
    /// is older than the lease TTL; a freshly created file may legitimately
    /// be observed before its payload lands.
    async fn holder_is_stale(&self, path: &Path, now: OffsetDateTime) -> LockResult<bool> {
        match tokio::fs::read(path).await {
            Ok(bytes) => match serde_json::from_slice::<LeaseFile>(&bytes) {
                Ok(recorded) => Ok(recorded.expires_at <= now),
                Err(_) => self.mtime_is_stale(path).await,
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(LockError::Io(e)),
        }
    }

    async fn mtime_is_stale(&self, path: &Path) -> LockResult<bool> {
        match tokio::fs::metadata(path).await {
            Ok(meta) => {
                let modified = meta.modified().map_err(LockError::Io)?;
                Ok(modified.elapsed().unwrap_or_default() > self.lease_ttl)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(LockError::Io(e)),
        }
    }
}

#[async_trait]
impl LockManager for FileLockManager {
    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn acquire(&self, key: &str, timeout: Duration) -> LockResult<Lease> {
        let path = self.lock_path(key)?;
        poll_acquire(key, timeout, self.retry_interval, || {
            self.try_acquire_once(key, &path)
        })
        .await
    }

    #[instrument(skip(self, lease), fields(backend = "filesystem", key = %lease.key))]
    async fn release(&self, lease: &Lease) -> LockResult<()> {
        let path = self.lock_path(&lease.key)?;

        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(LockError::NotHeld(lease.key.clone()));
            }
            Err(e) => return Err(LockError::Io(e)),
        };
        let recorded: LeaseFile =
            serde_json::from_slice(&bytes).map_err(|_| LockError::NotHeld(lease.key.clone()))?;
        if recorded.fencing_token != lease.fencing_token {
            return Err(LockError::NotHeld(lease.key.clone()));
        }

        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                tracing::debug!(key = %lease.key, "Lock released");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(LockError::NotHeld(lease.key.clone()))
            }
            Err(e) => Err(LockError::Io(e)),
        }
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const RETRY: Duration = Duration::from_millis(10);

    async fn manager(lease_ttl: Duration) -> (tempfile::TempDir, FileLockManager) {
        let temp = tempdir().unwrap();
        let manager = FileLockManager::new(temp.path(), lease_ttl, RETRY)
            .await
            .unwrap();
        (temp, manager)
    }

    #[tokio::test]
    async fn test_acquire_release_cycle() {
        let (_temp, locks) = manager(Duration::from_secs(30)).await;

        let lease = locks.acquire("a", Duration::from_millis(100)).await.unwrap();
        locks.release(&lease).await.unwrap();

        // The key is free again.
        let lease = locks.acquire("a", Duration::from_millis(100)).await.unwrap();
        locks.release(&lease).await.unwrap();
    }

    #[tokio::test]
    async fn test_second_acquire_times_out_busy() {
        let (_temp, locks) = manager(Duration::from_secs(30)).await;

        let _held = locks.acquire("a", Duration::from_millis(100)).await.unwrap();
        match locks.acquire("a", Duration::from_millis(50)).await {
            Err(LockError::Busy(_)) => {}
            other => panic!("expected Busy, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_independent_keys_do_not_contend() {
        let (_temp, locks) = manager(Duration::from_secs(30)).await;

        let _a = locks.acquire("a", Duration::from_millis(100)).await.unwrap();
        let _b = locks.acquire("b", Duration::from_millis(100)).await.unwrap();
    }

    #[tokio::test]
    async fn test_expired_lease_is_stolen() {
        let (_temp, locks) = manager(Duration::from_millis(50)).await;

        let stale = locks.acquire("a", Duration::from_millis(100)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;

        // A new contender steals the lapsed lease.
        let fresh = locks.acquire("a", Duration::from_millis(200)).await.unwrap();
        assert_ne!(stale.fencing_token, fresh.fencing_token);

        // The original holder cannot release what it no longer owns.
        match locks.release(&stale).await {
            Err(LockError::NotHeld(_)) => {}
            other => panic!("expected NotHeld, got {other:?}"),
        }

        locks.release(&fresh).await.unwrap();
    }

    #[tokio::test]
    async fn test_double_release_rejected() {
        let (_temp, locks) = manager(Duration::from_secs(30)).await;

        let lease = locks.acquire("a", Duration::from_millis(100)).await.unwrap();
        locks.release(&lease).await.unwrap();
        match locks.release(&lease).await {
            Err(LockError::NotHeld(_)) => {}
            other => panic!("expected NotHeld, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_invalid_key_rejected() {
        let (_temp, locks) = manager(Duration::from_secs(30)).await;
        assert!(locks.acquire("../escape", Duration::from_millis(50)).await.is_err());
        assert!(locks.acquire("", Duration::from_millis(50)).await.is_err());
    }
}
