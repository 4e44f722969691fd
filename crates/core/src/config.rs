//! Configuration types shared across crates.
//!
//! All backend selection happens here, once, at startup: each infrastructure
//! concern (storage, metadata, cache, lock) is a tagged enum resolved by its
//! crate's `from_config` factory into a trait object that gets injected into
//! the engine.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Paste handling limits and read-path tuning.
    #[serde(default)]
    pub paste: PasteConfig,
    /// Blob storage backend.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Paste record store.
    #[serde(default)]
    pub metadata: MetadataConfig,
    /// Read cache.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Distributed lock manager.
    #[serde(default)]
    pub lock: LockConfig,
    /// Background expiry sweeper.
    #[serde(default)]
    pub sweeper: SweeperConfig,
}

impl AppConfig {
    /// Validate all sections, failing fast on the first problem.
    pub fn validate(&self) -> Result<(), String> {
        self.paste.validate()?;
        self.storage.validate()?;
        self.metadata.validate()?;
        self.cache.validate()?;
        self.lock.validate()?;
        self.sweeper.validate()?;
        Ok(())
    }
}

/// Paste handling configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PasteConfig {
    /// Maximum uncompressed content size in bytes.
    #[serde(default = "default_max_content_bytes")]
    pub max_content_bytes: usize,
    /// TTL for cached paste reads in seconds.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    /// How long a mutation waits for the paste's lease before failing busy,
    /// in milliseconds.
    #[serde(default = "default_lock_wait_ms")]
    pub lock_wait_ms: u64,
    /// Content compression settings.
    #[serde(default)]
    pub compression: CompressionConfig,
}

impl PasteConfig {
    /// Cache TTL as a Duration.
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// Lock wait as a Duration.
    pub fn lock_wait(&self) -> Duration {
        Duration::from_millis(self.lock_wait_ms)
    }

    fn validate(&self) -> Result<(), String> {
        if self.max_content_bytes == 0 {
            return Err("paste.max_content_bytes must be greater than zero".to_string());
        }
        self.compression.validate()
    }
}

impl Default for PasteConfig {
    fn default() -> Self {
        Self {
            max_content_bytes: default_max_content_bytes(),
            cache_ttl_secs: default_cache_ttl_secs(),
            lock_wait_ms: default_lock_wait_ms(),
            compression: CompressionConfig::default(),
        }
    }
}

fn default_max_content_bytes() -> usize {
    256 * 1024
}

fn default_cache_ttl_secs() -> u64 {
    300
}

fn default_lock_wait_ms() -> u64 {
    5_000
}

/// Content compression configuration.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct CompressionConfig {
    /// Minimum content size in bytes before compression kicks in.
    #[serde(default = "default_compression_threshold")]
    pub threshold_bytes: usize,
    /// Gzip compression level (1-9).
    #[serde(default = "default_compression_level")]
    pub level: u32,
}

impl CompressionConfig {
    fn validate(&self) -> Result<(), String> {
        if !(1..=9).contains(&self.level) {
            return Err(format!(
                "paste.compression.level must be between 1 and 9, got {}",
                self.level
            ));
        }
        Ok(())
    }
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            threshold_bytes: default_compression_threshold(),
            level: default_compression_level(),
        }
    }
}

fn default_compression_threshold() -> usize {
    1024
}

fn default_compression_level() -> u32 {
    6
}

/// Blob storage backend configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Local filesystem storage.
    Filesystem {
        /// Root directory for blobs.
        path: PathBuf,
    },
    /// S3-compatible storage.
    S3 {
        /// Bucket name.
        bucket: String,
        /// Optional endpoint URL (for MinIO, etc.).
        endpoint: Option<String>,
        /// AWS region.
        region: Option<String>,
        /// Optional key prefix within the bucket.
        prefix: Option<String>,
        /// AWS access key ID. Falls back to the ambient AWS credential chain
        /// if not set. Prefer env vars or IAM roles over config files.
        access_key_id: Option<String>,
        /// AWS secret access key.
        secret_access_key: Option<String>,
        /// Force path-style URLs (`endpoint/bucket/key`). Required for MinIO
        /// and some S3-compatible services.
        #[serde(default)]
        force_path_style: bool,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Filesystem {
            path: PathBuf::from("./data/blobs"),
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            StorageConfig::S3 {
                bucket,
                access_key_id,
                secret_access_key,
                ..
            } => {
                if bucket.is_empty() {
                    return Err("storage.bucket must not be empty".to_string());
                }
                match (access_key_id.as_ref(), secret_access_key.as_ref()) {
                    (Some(_), Some(_)) | (None, None) => Ok(()),
                    _ => Err(
                        "s3 config requires both access_key_id and secret_access_key when either is set"
                            .to_string(),
                    ),
                }
            }
            StorageConfig::Filesystem { .. } => Ok(()),
        }
    }
}

/// Paste record store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetadataConfig {
    /// SQLite database (single-instance deployments and testing).
    Sqlite {
        /// Database file path.
        path: PathBuf,
    },
    /// PostgreSQL database (multi-instance deployments).
    Postgres {
        /// Connection URL.
        url: String,
        /// Maximum connections in the pool.
        #[serde(default = "default_pg_max_connections")]
        max_connections: u32,
        /// Statement timeout in milliseconds. PostgreSQL cancels queries
        /// that exceed this duration.
        #[serde(default = "default_statement_timeout_ms")]
        statement_timeout_ms: Option<u64>,
    },
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: PathBuf::from("./data/metadata.db"),
        }
    }
}

impl MetadataConfig {
    /// Validate metadata configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            MetadataConfig::Sqlite { .. } => Ok(()),
            MetadataConfig::Postgres { url, .. } => {
                if url.is_empty() {
                    Err("metadata.url must not be empty".to_string())
                } else {
                    Ok(())
                }
            }
        }
    }
}

fn default_pg_max_connections() -> u32 {
    10
}

fn default_statement_timeout_ms() -> Option<u64> {
    Some(30_000)
}

/// Read cache configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CacheConfig {
    /// Bounded in-process cache with LRU eviction.
    Memory {
        /// Item-count ceiling before LRU eviction kicks in.
        #[serde(default = "default_cache_max_entries")]
        max_entries: usize,
        /// Interval between background sweeps of expired entries, in seconds.
        #[serde(default = "default_cache_sweep_interval_secs")]
        sweep_interval_secs: u64,
    },
    /// Shared PostgreSQL-backed cache visible to all service instances.
    Shared {
        /// Connection URL.
        url: String,
        /// Maximum connections in the pool.
        #[serde(default = "default_shared_max_connections")]
        max_connections: u32,
        /// Interval between background sweeps of expired rows, in seconds.
        #[serde(default = "default_cache_sweep_interval_secs")]
        sweep_interval_secs: u64,
    },
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::Memory {
            max_entries: default_cache_max_entries(),
            sweep_interval_secs: default_cache_sweep_interval_secs(),
        }
    }
}

impl CacheConfig {
    /// Validate cache configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            CacheConfig::Memory {
                max_entries,
                sweep_interval_secs,
            } => {
                if *max_entries == 0 {
                    return Err("cache.max_entries must be greater than zero".to_string());
                }
                if *sweep_interval_secs == 0 {
                    return Err("cache.sweep_interval_secs must be greater than zero".to_string());
                }
                Ok(())
            }
            CacheConfig::Shared {
                url,
                sweep_interval_secs,
                ..
            } => {
                if url.is_empty() {
                    return Err("cache.url must not be empty".to_string());
                }
                if *sweep_interval_secs == 0 {
                    return Err("cache.sweep_interval_secs must be greater than zero".to_string());
                }
                Ok(())
            }
        }
    }
}

fn default_cache_max_entries() -> usize {
    1024
}

fn default_cache_sweep_interval_secs() -> u64 {
    60
}

fn default_shared_max_connections() -> u32 {
    4
}

/// Distributed lock configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LockConfig {
    /// Advisory lock files on a local or shared filesystem.
    Filesystem {
        /// Directory for lock files.
        #[serde(default = "default_lock_dir")]
        dir: PathBuf,
        /// Maximum lease lifetime in seconds; a lease older than this is
        /// considered stale and can be stolen.
        #[serde(default = "default_lease_ttl_secs")]
        lease_ttl_secs: u64,
        /// Polling interval while waiting for a held lock, in milliseconds.
        #[serde(default = "default_lock_retry_interval_ms")]
        retry_interval_ms: u64,
    },
    /// Shared PostgreSQL-backed locks visible to all service instances.
    Shared {
        /// Connection URL.
        url: String,
        /// Maximum connections in the pool.
        #[serde(default = "default_shared_max_connections")]
        max_connections: u32,
        /// Maximum lease lifetime in seconds.
        #[serde(default = "default_lease_ttl_secs")]
        lease_ttl_secs: u64,
        /// Polling interval while waiting for a held lock, in milliseconds.
        #[serde(default = "default_lock_retry_interval_ms")]
        retry_interval_ms: u64,
    },
}

impl Default for LockConfig {
    fn default() -> Self {
        Self::Filesystem {
            dir: default_lock_dir(),
            lease_ttl_secs: default_lease_ttl_secs(),
            retry_interval_ms: default_lock_retry_interval_ms(),
        }
    }
}

impl LockConfig {
    /// Validate lock configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        let (lease_ttl_secs, retry_interval_ms) = match self {
            LockConfig::Filesystem {
                lease_ttl_secs,
                retry_interval_ms,
                ..
            } => (*lease_ttl_secs, *retry_interval_ms),
            LockConfig::Shared {
                url,
                lease_ttl_secs,
                retry_interval_ms,
                ..
            } => {
                if url.is_empty() {
                    return Err("lock.url must not be empty".to_string());
                }
                (*lease_ttl_secs, *retry_interval_ms)
            }
        };
        if lease_ttl_secs == 0 {
            return Err("lock.lease_ttl_secs must be greater than zero".to_string());
        }
        if retry_interval_ms == 0 {
            return Err("lock.retry_interval_ms must be greater than zero".to_string());
        }
        Ok(())
    }
}

fn default_lock_dir() -> PathBuf {
    PathBuf::from("./data/locks")
}

fn default_lease_ttl_secs() -> u64 {
    30
}

fn default_lock_retry_interval_ms() -> u64 {
    50
}

/// Background expiry sweeper configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SweeperConfig {
    /// Whether the sweeper runs at all.
    #[serde(default = "default_sweeper_enabled")]
    pub enabled: bool,
    /// Interval between purge passes in seconds.
    #[serde(default = "default_sweeper_interval_secs")]
    pub interval_secs: u64,
    /// Records processed per scan batch.
    #[serde(default = "default_sweeper_batch_size")]
    pub batch_size: u32,
    /// How long soft-deleted pastes are retained before being purged, in
    /// hours. Absent means soft-deleted pastes are kept until the end of
    /// time (only expiry purges them).
    #[serde(default)]
    pub keep_deleted_hours: Option<u32>,
}

impl SweeperConfig {
    /// Sweep interval as a Duration.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Retention window for soft-deleted pastes, if configured.
    pub fn retention(&self) -> Option<time::Duration> {
        self.keep_deleted_hours
            .map(|hours| time::Duration::hours(i64::from(hours)))
    }

    fn validate(&self) -> Result<(), String> {
        if self.interval_secs == 0 {
            return Err("sweeper.interval_secs must be greater than zero".to_string());
        }
        if self.batch_size == 0 {
            return Err("sweeper.batch_size must be greater than zero".to_string());
        }
        Ok(())
    }
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            enabled: default_sweeper_enabled(),
            interval_secs: default_sweeper_interval_secs(),
            batch_size: default_sweeper_batch_size(),
            keep_deleted_hours: None,
        }
    }
}

fn default_sweeper_enabled() -> bool {
    true
}

fn default_sweeper_interval_secs() -> u64 {
    300
}

fn default_sweeper_batch_size() -> u32 {
    100
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        config.validate().unwrap();
    }

    #[test]
    fn test_s3_partial_credentials_rejected() {
        let config = StorageConfig::S3 {
            bucket: "pastes".to_string(),
            endpoint: None,
            region: None,
            prefix: None,
            access_key_id: Some("access".to_string()),
            secret_access_key: None,
            force_path_style: false,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_compression_level_bounds() {
        let mut config = AppConfig::default();
        config.paste.compression.level = 0;
        assert!(config.validate().is_err());
        config.paste.compression.level = 10;
        assert!(config.validate().is_err());
        config.paste.compression.level = 9;
        config.validate().unwrap();
    }

    #[test]
    fn test_storage_config_from_toml() {
        let toml = r#"
            type = "s3"
            bucket = "pastes"
            endpoint = "minio:9000"
            force_path_style = true
        "#;
        let config: StorageConfig = toml::from_str(toml).unwrap();
        match config {
            StorageConfig::S3 {
                bucket,
                endpoint,
                force_path_style,
                ..
            } => {
                assert_eq!(bucket, "pastes");
                assert_eq!(endpoint.as_deref(), Some("minio:9000"));
                assert!(force_path_style);
            }
            other => panic!("unexpected config: {other:?}"),
        }
    }

    #[test]
    fn test_sweeper_retention() {
        let mut config = SweeperConfig::default();
        assert!(config.retention().is_none());
        config.keep_deleted_hours = Some(24);
        assert_eq!(config.retention(), Some(time::Duration::hours(24)));
    }

    #[test]
    fn test_sweeper_zero_interval_rejected() {
        let mut config = AppConfig::default();
        config.sweeper.interval_secs = 0;
        assert!(config.validate().is_err());
    }
}
