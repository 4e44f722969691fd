//! Read cache for the snip paste engine.
//!
//! This crate provides:
//! - The `PasteCache` trait, keyed by `(paste id, version)`
//! - A bounded in-process variant with LRU eviction and lazy TTL expiry
//! - A shared PostgreSQL-backed variant relying on TTL eviction
//! - A `from_config` factory selecting the variant once at startup

pub mod error;
pub mod memory;
pub mod shared;
pub mod traits;

pub use error::{CacheError, CacheResult};
pub use memory::MemoryCache;
pub use shared::SharedCache;
pub use traits::{CacheEntry, CacheKey, PasteCache};

use snip_core::config::CacheConfig;
use std::sync::Arc;
use std::time::Duration;

/// Create a paste cache from configuration.
///
/// Spawns the variant's background sweep task; the task exits on its own
/// once the returned cache is dropped.
pub async fn from_config(config: &CacheConfig) -> CacheResult<Arc<dyn PasteCache>> {
    config.validate().map_err(CacheError::Config)?;

    match config {
        CacheConfig::Memory {
            max_entries,
            sweep_interval_secs,
        } => {
            let cache = Arc::new(MemoryCache::new(*max_entries));
            cache.clone().spawn_sweeper(Duration::from_secs(*sweep_interval_secs));
            Ok(cache)
        }
        CacheConfig::Shared {
            url,
            max_connections,
            sweep_interval_secs,
        } => {
            tracing::info!("Connecting to shared cache");
            let cache = Arc::new(SharedCache::new(url, *max_connections).await?);
            cache.clone().spawn_sweeper(Duration::from_secs(*sweep_interval_secs));
            Ok(cache)
        }
    }
}
