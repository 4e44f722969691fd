//! PostgreSQL-based paste store implementation.

use crate::error::{MetadataError, MetadataResult};
use crate::models::PasteRow;
use crate::store::PasteStore;
use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{Pool, Postgres};
use std::str::FromStr;
use time::OffsetDateTime;
use uuid::Uuid;

/// PostgreSQL schema (embedded).
const POSTGRES_SCHEMA: &str = include_str!("postgres_schema.sql");

/// Split the schema into individual statements; PostgreSQL does not allow
/// multiple statements in one prepared statement.
fn postgres_schema_statements(schema: &str) -> Vec<&str> {
    schema
        .split(';')
        .filter_map(|statement| {
            let trimmed = statement.trim();
            if trimmed.is_empty() {
                return None;
            }
            let has_sql = trimmed.lines().any(|line| {
                let line = line.trim();
                !line.is_empty() && !line.starts_with("--")
            });
            has_sql.then_some(trimmed)
        })
        .collect()
}

/// PostgreSQL-based paste store for multi-instance deployments.
pub struct PostgresStore {
    pool: Pool<Postgres>,
}

impl PostgresStore {
    /// Create a new PostgreSQL store from a connection URL.
    pub async fn new(
        url: &str,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> MetadataResult<Self> {
        let mut opts = PgConnectOptions::from_str(url)?;

        // Cap statement runtime so hung queries cannot stall the sweeper.
        if let Some(timeout_ms) = statement_timeout_ms {
            opts = opts.options([("statement_timeout", format!("{timeout_ms}ms"))]);
        }

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;

        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }
}

#[async_trait]
impl PasteStore for PostgresStore {
    async fn migrate(&self) -> MetadataResult<()> {
        for statement in postgres_schema_statements(POSTGRES_SCHEMA) {
            sqlx::query(statement).execute(&self.pool).await?;
        }
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
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
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
        let row = sqlx::query_as::<_, PasteRow>("SELECT * FROM pastes WHERE paste_id = $1")
            .bind(paste_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn update_paste(&self, row: &PasteRow, expected_version: i64) -> MetadataResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE pastes SET
                title = $1, content_language = $2, blob_key = $3,
                size_bytes = $4, compressed = $5, checksum = $6, version = $7,
                updated_at = $8, expires_at = $9, deleted_at = $10
            WHERE paste_id = $11 AND version = $12
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
        sqlx::query("DELETE FROM pastes WHERE paste_id = $1")
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
            "SELECT * FROM pastes WHERE expires_at IS NOT NULL AND expires_at <= $1 ORDER BY expires_at LIMIT $2",
        )
        .bind(now)
        .bind(i64::from(limit))
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
            "SELECT * FROM pastes WHERE deleted_at IS NOT NULL AND deleted_at <= $1 ORDER BY deleted_at LIMIT $2",
        )
        .bind(cutoff)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn count_active_pastes(&self, now: OffsetDateTime) -> MetadataResult<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM pastes WHERE deleted_at IS NULL AND (expires_at IS NULL OR expires_at > $1)",
        )
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(count as u64)
    }
}
