//! Shared PostgreSQL-backed locking.

use crate::error::{LockError, LockResult};
use crate::lease::{poll_acquire, Lease, LockManager};
use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{Pool, Postgres};
use std::str::FromStr;
use std::time::Duration;
use time::OffsetDateTime;
use tracing::instrument;
use uuid::Uuid;

/// Distributed locks over a PostgreSQL table shared by every instance.
///
/// Acquisition is a single atomic set-if-absent: the insert either claims a
/// free key or, via the conditional conflict update, steals a key whose
/// lease has lapsed. Release deletes the row only when the fencing token
/// still matches.
pub struct SharedLockManager {
    pool: Pool<Postgres>,
    lease_ttl: Duration,
    retry_interval: Duration,
}

impl SharedLockManager {
    /// Connect to the lock database and apply the schema.
    pub async fn new(
        url: &str,
        max_connections: u32,
        lease_ttl: Duration,
        retry_interval: Duration,
    ) -> LockResult<Self> {
        let opts = PgConnectOptions::from_str(url)?;
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect_with(opts)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS paste_locks (
                lock_key TEXT PRIMARY KEY,
                fencing_token UUID NOT NULL,
                expires_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        Ok(Self {
            pool,
            lease_ttl,
            retry_interval,
        })
    }

    async fn try_acquire_once(&self, key: &str) -> LockResult<Option<Lease>> {
        let now = OffsetDateTime::now_utc();
        let lease = Lease {
            key: key.to_string(),
            fencing_token: Uuid::new_v4(),
            expires_at: now + self.lease_ttl,
        };

        let result = sqlx::query(
            r#"
            INSERT INTO paste_locks (lock_key, fencing_token, expires_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (lock_key) DO UPDATE
            SET fencing_token = EXCLUDED.fencing_token,
                expires_at = EXCLUDED.expires_at
            WHERE paste_locks.expires_at <= $4
            "#,
        )
        .bind(&lease.key)
        .bind(lease.fencing_token)
        .bind(lease.expires_at)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            tracing::debug!(key, "Lock acquired");
            Ok(Some(lease))
        } else {
            Ok(None)
        }
    }
}

#[async_trait]
impl LockManager for SharedLockManager {
    #[instrument(skip(self), fields(backend = "shared"))]
    async fn acquire(&self, key: &str, timeout: Duration) -> LockResult<Lease> {
        poll_acquire(key, timeout, self.retry_interval, || {
            self.try_acquire_once(key)
        })
        .await
    }

    #[instrument(skip(self, lease), fields(backend = "shared", key = %lease.key))]
    async fn release(&self, lease: &Lease) -> LockResult<()> {
        let result =
            sqlx::query("DELETE FROM paste_locks WHERE lock_key = $1 AND fencing_token = $2")
                .bind(&lease.key)
                .bind(lease.fencing_token)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(LockError::NotHeld(lease.key.clone()));
        }
        tracing::debug!(key = %lease.key, "Lock released");
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "shared"
    }
}
