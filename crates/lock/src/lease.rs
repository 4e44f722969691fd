//! Lease type, lock manager trait, and the RAII release guard.

use crate::error::{LockError, LockResult};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use uuid::Uuid;

/// A time-bounded exclusive grant on a lock key.
///
/// The fencing token proves ownership: release verifies it, so a revived or
/// slow holder cannot release a lease it lost to an expiry steal.
#[derive(Clone, Debug)]
pub struct Lease {
    /// The locked key.
    pub key: String,
    /// Opaque ownership proof, checked on release.
    pub fencing_token: Uuid,
    /// When this lease lapses and becomes stealable.
    pub expires_at: OffsetDateTime,
}

/// Distributed mutual exclusion per paste id.
///
/// At most one live lease exists per key across the whole deployment. Every
/// lease has a bounded lifetime, so a crashed holder cannot deadlock a key
/// forever.
#[async_trait]
pub trait LockManager: Send + Sync + 'static {
    /// Acquire the lock for `key`, polling up to `timeout` before failing
    /// with [`LockError::Busy`].
    async fn acquire(&self, key: &str, timeout: Duration) -> LockResult<Lease>;

    /// Release a lease. Fails with [`LockError::NotHeld`] when the fencing
    /// token no longer matches the current holder.
    async fn release(&self, lease: &Lease) -> LockResult<()>;

    /// Get the name of this lock backend, for logging.
    fn backend_name(&self) -> &'static str;
}

/// Guard that releases a lease on drop unless explicitly released.
///
/// Callers release on the success path with [`LeaseGuard::release`]; early
/// returns and errors fall back to a best-effort async release spawned from
/// `Drop`, so every exit path gives the lock back.
pub struct LeaseGuard {
    lease: Option<Lease>,
    manager: Arc<dyn LockManager>,
    runtime_handle: Option<tokio::runtime::Handle>,
}

impl LeaseGuard {
    /// Wrap a freshly acquired lease.
    pub fn new(manager: Arc<dyn LockManager>, lease: Lease) -> Self {
        Self {
            lease: Some(lease),
            manager,
            runtime_handle: tokio::runtime::Handle::try_current().ok(),
        }
    }

    /// The guarded lease.
    ///
    /// # Panics
    ///
    /// Panics if called after `release()`.
    pub fn lease(&self) -> &Lease {
        self.lease.as_ref().expect("lease already released")
    }

    /// Release the lease explicitly. Consumes the guard.
    pub async fn release(mut self) -> LockResult<()> {
        match self.lease.take() {
            Some(lease) => self.manager.release(&lease).await,
            None => Ok(()),
        }
    }
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        let Some(lease) = self.lease.take() else {
            return;
        };
        let manager = self.manager.clone();
        if let Some(handle) = &self.runtime_handle {
            handle.spawn(async move {
                if let Err(e) = manager.release(&lease).await {
                    tracing::warn!(key = %lease.key, error = %e, "Failed to release lease on drop");
                }
            });
        } else {
            // No runtime to spawn on; the lease will lapse at its expiry.
            tracing::warn!(
                key = %lease.key,
                "Lease guard dropped outside a runtime, waiting out the lease TTL"
            );
        }
    }
}

/// Shared acquire loop: poll `try_acquire` until it grants or `timeout`
/// elapses.
pub(crate) async fn poll_acquire<F, Fut>(
    key: &str,
    timeout: Duration,
    retry_interval: Duration,
    mut try_acquire: F,
) -> LockResult<Lease>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = LockResult<Option<Lease>>>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if let Some(lease) = try_acquire().await? {
            return Ok(lease);
        }
        if tokio::time::Instant::now() + retry_interval > deadline {
            return Err(LockError::Busy(key.to_string()));
        }
        tokio::time::sleep(retry_interval).await;
    }
}
