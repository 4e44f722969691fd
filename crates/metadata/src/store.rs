//! Paste store trait and SQLite implementation.

use crate::error::{MetadataError, MetadataResult};
use crate::models::PasteRow;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use time::OffsetDateTime;
use uuid::Uuid;

/// Durable paste record persistence.
///
/// Concurrency contract: `update_paste` is conditional on the version the
/// caller observed. In normal operation the lock manager already serializes
/// writers per paste; the version check is defense in depth against
/// lock-bypass bugs, not the primary concurrency mechanism.
#[async_trait]
pub trait PasteStore: Send + Sync {
    /// Apply the embedded schema.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity.
    async fn health_check(&self) -> MetadataResult<()>;

    /// Insert a new paste record. Fails with `AlreadyExists` if the id is
    /// taken.
    async fn insert_paste(&self, row: &PasteRow) -> MetadataResult<()>;

    /// Fetch a paste record by id.
    async fn get_paste(&self, paste_id: Uuid) -> MetadataResult<Option<PasteRow>>;

    /// Persist a mutated record, conditioned on the version the caller
    /// observed. `row.version` carries the new version. Fails with
    /// `VersionConflict` when the stored version no longer matches
    /// `expected_version`, and `NotFound` when the record is gone.
    async fn update_paste(&self, row: &PasteRow, expected_version: i64) -> MetadataResult<()>;

    /// Physically remove a paste record. Removing an absent id succeeds, so
    /// purge retries converge.
    async fn delete_paste(&self, paste_id: Uuid) -> MetadataResult<()>;

    /// Records whose expiry has passed at `now`, oldest first.
    async fn expired_pastes(
        &self,
        now: OffsetDateTime,
        limit: u32,
    ) -> MetadataResult<Vec<PasteRow>>;

    /// Soft-deleted records whose `deleted_at` is before `cutoff`, oldest
    /// first.
    async fn soft_deleted_before(
        &self,
        cutoff: OffsetDateTime,
        limit: u32,
    ) -> MetadataResult<Vec<PasteRow>>;

    /// Count records that are live at `now` (not deleted, not expired).
    async fn count_active_pastes(&self, now: OffsetDateTime) -> MetadataResult<u64>;
}

/// SQLite-based paste store.
///
/// Suitable for single-instance deployments and testing; multi-instance
/// deployments should use [`crate::PostgresStore`].
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Create a new SQLite store at the given path.
    pub async fn new(path: impl AsRef<Path>) -> MetadataResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| MetadataError::Config(format!("cannot create {parent:?}: {e}")))?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            // Prevent transient "database is locked" errors under concurrent access.
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            // SQLite permits limited write concurrency; a single connection
            // avoids persistent "database is locked" failures.
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;

        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[async_trait]
impl PasteStore for SqliteStore {
    async fn migrate(&self) -> MetadataResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn insert_paste(&self, row: &PasteRow) -> MetadataResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO pastes (
                paste_id, title, content_language, blob_key, size_bytes,
                compressed, checksum, version, edit_token_hash,
                delete_token_hash, created_at, updated_at, expires_at,
                deleted_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(row.paste_id)
        .bind(&row.title)
        .bind(&row.content_language)
        .bind(&row.blob_key)
        .bind(row.size_bytes)
        .bind(row.compressed)
        .bind(&row.checksum)
        .bind(row.version)
        .bind(&row.edit_token_hash)
        .bind(&row.delete_token_hash)
        .bind(row.created_at)
        .bind(row.updated_at)
        .bind(row.expires_at)
        .bind(row.deleted_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => Err(
                MetadataError::AlreadyExists(format!("paste {}", row.paste_id)),
            ),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_paste(&self, paste_id: Uuid) -> MetadataResult<Option<PasteRow>> {
        let row = sqlx::query_as::<_, PasteRow>("SELECT * FROM pastes WHERE paste_id = ?")
            .bind(paste_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn update_paste(&self, row: &PasteRow, expected_version: i64) -> MetadataResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE pastes SET
                title = ?, content_language = ?, blob_key = ?, size_bytes = ?,
                compressed = ?, checksum = ?, version = ?, updated_at = ?,
                expires_at = ?, deleted_at = ?
            WHERE paste_id = ? AND version = ?
            "#,
        )
        .bind(&row.title)
        .bind(&row.content_language)
        .bind(&row.blob_key)
        .bind(row.size_bytes)
        .bind(row.compressed)
        .bind(&row.checksum)
        .bind(row.version)
        .bind(row.updated_at)
        .bind(row.expires_at)
        .bind(row.deleted_at)
        .bind(row.paste_id)
        .bind(expected_version)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return if self.get_paste(row.paste_id).await?.is_some() {
                Err(MetadataError::VersionConflict {
                    paste_id: row.paste_id.to_string(),
                    expected: expected_version,
                })
            } else {
                Err(MetadataError::NotFound(format!("paste {}", row.paste_id)))
            };
        }
        Ok(())
    }

    async fn delete_paste(&self, paste_id: Uuid) -> MetadataResult<()> {
        sqlx::query("DELETE FROM pastes WHERE paste_id = ?")
            .bind(paste_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn expired_pastes(
        &self,
        now: OffsetDateTime,
        limit: u32,
    ) -> MetadataResult<Vec<PasteRow>> {
        let rows = sqlx::query_as::<_, PasteRow>(
            "SELECT * FROM pastes WHERE expires_at IS NOT NULL AND expires_at <= ? ORDER BY expires_at LIMIT ?",
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn soft_deleted_before(
        &self,
        cutoff: OffsetDateTime,
        limit: u32,
    ) -> MetadataResult<Vec<PasteRow>> {
        let rows = sqlx::query_as::<_, PasteRow>(
            "SELECT * FROM pastes WHERE deleted_at IS NOT NULL AND deleted_at <= ? ORDER BY deleted_at LIMIT ?",
        )
        .bind(cutoff)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn count_active_pastes(&self, now: OffsetDateTime) -> MetadataResult<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM pastes WHERE deleted_at IS NULL AND (expires_at IS NULL OR expires_at > ?)",
        )
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(count as u64)
    }
}

const SCHEMA_SQL: &str = r#"
-- Paste records
CREATE TABLE IF NOT EXISTS pastes (
    paste_id BLOB PRIMARY KEY,
    title TEXT NOT NULL,
    content_language TEXT NOT NULL DEFAULT 'plain_text',
    blob_key TEXT NOT NULL,
    size_bytes INTEGER NOT NULL,
    compressed INTEGER NOT NULL DEFAULT 0,
    checksum TEXT NOT NULL,
    version INTEGER NOT NULL DEFAULT 1,
    edit_token_hash TEXT NOT NULL,
    delete_token_hash TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT,
    expires_at TEXT,
    deleted_at TEXT
);
CREATE INDEX IF NOT EXISTS idx_pastes_expires_at ON pastes(expires_at) WHERE expires_at IS NOT NULL;
CREATE INDEX IF NOT EXISTS idx_pastes_deleted_at ON pastes(deleted_at) WHERE deleted_at IS NOT NULL;
"#;
