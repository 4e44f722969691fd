//! Shared PostgreSQL-backed cache.

use crate::error::CacheResult;
use crate::traits::{CacheEntry, CacheKey, PasteCache};
use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{Pool, Postgres};
use std::str::FromStr;
use std::sync::{Arc, Weak};
use std::time::Duration;
use time::OffsetDateTime;
use tokio::task::JoinHandle;

/// Shared cache visible to every service instance.
///
/// No local size bound; TTL is the primary eviction mechanism. Rows past
/// their expiry behave as absent on read and are reclaimed by the periodic
/// sweep, so all instances observe consistent invalidations.
#[derive(Debug)]
pub struct SharedCache {
    pool: Pool<Postgres>,
}

impl SharedCache {
    /// Connect to the shared cache database and apply the schema.
    pub async fn new(url: &str, max_connections: u32) -> CacheResult<Self> {
        let opts = PgConnectOptions::from_str(url)?;
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect_with(opts)
            .await?;

        let cache = Self { pool };
        cache.migrate().await?;
        Ok(cache)
    }

    async fn migrate(&self) -> CacheResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS paste_cache (
                cache_key TEXT PRIMARY KEY,
                payload TEXT NOT NULL,
                expires_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_paste_cache_expires_at ON paste_cache (expires_at)",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Remove all expired rows. Returns how many were dropped.
    pub async fn sweep_expired(&self) -> CacheResult<u64> {
        let result = sqlx::query("DELETE FROM paste_cache WHERE expires_at <= $1")
            .bind(OffsetDateTime::now_utc())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Spawn a background task sweeping expired rows at `interval`.
    ///
    /// The task holds only a weak reference and exits once the cache is
    /// dropped.
    pub fn spawn_sweeper(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(&self);
        drop(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(cache) = weak.upgrade() else {
                    break;
                };
                match cache.sweep_expired().await {
                    Ok(dropped) if dropped > 0 => {
                        tracing::debug!(dropped, "Swept expired shared cache rows");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!(error = %e, "Shared cache sweep failed");
                    }
                }
            }
        })
    }
}

#[async_trait]
impl PasteCache for SharedCache {
    async fn get(&self, key: &CacheKey) -> CacheResult<Option<CacheEntry>> {
        let payload: Option<String> = sqlx::query_scalar(
            "SELECT payload FROM paste_cache WHERE cache_key = $1 AND expires_at > $2",
        )
        .bind(key.to_string())
        .bind(OffsetDateTime::now_utc())
        .fetch_optional(&self.pool)
        .await?;

        match payload {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn put(&self, key: &CacheKey, entry: CacheEntry, ttl: Duration) -> CacheResult<()> {
        let payload = serde_json::to_string(&entry)?;
        let expires_at = OffsetDateTime::now_utc() + ttl;
        sqlx::query(
            r#"
            INSERT INTO paste_cache (cache_key, payload, expires_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (cache_key)
            DO UPDATE SET payload = EXCLUDED.payload, expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(key.to_string())
        .bind(payload)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn invalidate(&self, key: &CacheKey) -> CacheResult<()> {
        sqlx::query("DELETE FROM paste_cache WHERE cache_key = $1")
            .bind(key.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "shared"
    }
}
