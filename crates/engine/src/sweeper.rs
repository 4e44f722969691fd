//! Background expiry sweeper.

use crate::error::PasteResult;
use crate::paste::PurgeStats;
use crate::service::PasteService;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Periodically purges expired and retention-lapsed pastes.
pub struct ExpirySweeper {
    service: Arc<PasteService>,
    interval: Duration,
}

impl ExpirySweeper {
    /// Create a sweeper over the given service.
    pub fn new(service: Arc<PasteService>, interval: Duration) -> Self {
        Self { service, interval }
    }

    /// Run a single purge pass.
    pub async fn run_once(&self) -> PasteResult<PurgeStats> {
        self.service.purge_expired().await
    }

    /// Spawn the sweep loop. Errors are logged and the loop continues; a
    /// failed pass just leaves work for the next one.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            // Consume the immediate first tick so the loop waits a full
            // interval before the first pass.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match self.service.purge_expired().await {
                    Ok(stats) if stats.scanned > 0 => {
                        tracing::info!(
                            purged = stats.purged,
                            skipped = stats.skipped,
                            errors = stats.errors,
                            "Sweep pass finished"
                        );
                    }
                    Ok(_) => {
                        tracing::debug!("Sweep pass found nothing to purge");
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Sweep pass failed");
                    }
                }
            }
        })
    }
}
