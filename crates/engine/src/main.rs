//! Snip maintenance daemon.
//!
//! Hosts the paste engine's background work: loads configuration, builds
//! the configured backends, and runs the expiry sweeper against shared
//! storage. The API layer runs the same engine in its own process; this
//! daemon keeps purge responsibility in exactly one place.

use anyhow::{Context, Result};
use clap::Parser;
use figment::providers::{Env, Format, Toml};
use figment::Figment;
use snip_core::AppConfig;
use snip_engine::{ExpirySweeper, PasteService};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Snip - paste engine maintenance daemon
#[derive(Parser, Debug)]
#[command(name = "snipd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "SNIP_CONFIG", default_value = "config/snipd.toml")]
    config: String,

    /// Run a single purge pass and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Snip v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration: optional TOML file, overridable via SNIP_ env
    // vars (SNIP_STORAGE__TYPE=s3 etc).
    let config_path = std::path::Path::new(&args.config);
    let mut figment = Figment::new();
    if config_path.exists() {
        tracing::info!(config_path = %args.config, "Loading configuration from file");
        figment = figment.merge(Toml::file(&args.config));
    } else {
        tracing::debug!("No config file found at {}", args.config);
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("SNIP_").split("__"))
        .extract()
        .context("failed to load configuration")?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!(e))
        .context("invalid configuration")?;

    // Build the backends, selected once here and injected below.
    let storage = snip_storage::from_config(&config.storage)
        .await
        .context("failed to initialize storage")?;
    storage
        .health_check()
        .await
        .context("storage health check failed")?;
    tracing::info!(backend = storage.backend_name(), "Storage backend ready");

    let store = snip_metadata::from_config(&config.metadata)
        .await
        .context("failed to initialize metadata store")?;
    store
        .health_check()
        .await
        .context("metadata health check failed")?;
    tracing::info!("Metadata store ready");

    let cache = snip_cache::from_config(&config.cache)
        .await
        .context("failed to initialize cache")?;
    tracing::info!(backend = cache.backend_name(), "Cache ready");

    let locks = snip_lock::from_config(&config.lock)
        .await
        .context("failed to initialize lock manager")?;
    tracing::info!(backend = locks.backend_name(), "Lock manager ready");

    let service = Arc::new(PasteService::new(&config, storage, store, cache, locks));

    match service.active_paste_count().await {
        Ok(count) => tracing::info!(count, "Active pastes"),
        Err(e) => tracing::warn!(error = %e, "Failed to count active pastes"),
    }

    let sweeper = ExpirySweeper::new(service, config.sweeper.interval());

    if args.once {
        let stats = sweeper.run_once().await.context("purge pass failed")?;
        tracing::info!(
            scanned = stats.scanned,
            purged = stats.purged,
            skipped = stats.skipped,
            errors = stats.errors,
            "Purge pass finished"
        );
        return Ok(());
    }

    if !config.sweeper.enabled {
        anyhow::bail!("sweeper.enabled is false and --once was not given; nothing to do");
    }

    let handle = sweeper.spawn();
    tracing::info!(
        interval_secs = config.sweeper.interval_secs,
        "Expiry sweeper running"
    );

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    tracing::info!("Shutting down");
    handle.abort();

    Ok(())
}
