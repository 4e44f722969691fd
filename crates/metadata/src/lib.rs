//! Paste record persistence for the snip paste engine.
//!
//! This crate provides the control-plane data model:
//! - The `PasteStore` trait with optimistic-concurrency updates
//! - SQLite and PostgreSQL implementations with embedded schemas
//! - Batch scan queries backing the expiry sweeper

pub mod error;
pub mod models;
pub mod postgres;
pub mod store;

pub use error::{MetadataError, MetadataResult};
pub use models::PasteRow;
pub use postgres::PostgresStore;
pub use store::{PasteStore, SqliteStore};

use snip_core::config::MetadataConfig;
use std::sync::Arc;

/// Create a paste store from configuration.
pub async fn from_config(config: &MetadataConfig) -> MetadataResult<Arc<dyn PasteStore>> {
    config.validate().map_err(MetadataError::Config)?;

    match config {
        MetadataConfig::Sqlite { path } => {
            let store = SqliteStore::new(path).await?;
            Ok(Arc::new(store) as Arc<dyn PasteStore>)
        }
        MetadataConfig::Postgres {
            url,
            max_connections,
            statement_timeout_ms,
        } => {
            tracing::info!("Connecting to PostgreSQL metadata store");
            let store = PostgresStore::new(url, *max_connections, *statement_timeout_ms).await?;
            Ok(Arc::new(store) as Arc<dyn PasteStore>)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn from_config_sqlite_ok() {
        let temp = tempdir().unwrap();
        let config = MetadataConfig::Sqlite {
            path: temp.path().join("metadata.db"),
        };

        let store = from_config(&config).await.unwrap();
        store.health_check().await.unwrap();
    }
}
