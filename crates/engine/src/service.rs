//! Paste lifecycle orchestration.
//!
//! `PasteService` wires the blob store, record store, cache, and lock
//! manager into the create → read → edit → soft-delete → purge lifecycle.
//! Reads never lock; every mutation runs under the paste's lease and
//! releases it on all exit paths.

use crate::codec::{CodecError, ContentCodec};
use crate::error::{PasteError, PasteResult};
use crate::paste::{CreatedPaste, NewPaste, Paste, PurgeStats, UpdatePaste};
use crate::token::TokenService;
use snip_cache::{CacheEntry, CacheKey, PasteCache};
use snip_core::config::AppConfig;
use snip_core::hash::ContentHash;
use snip_lock::{LeaseGuard, LockManager};
use snip_metadata::{PasteRow, PasteStore};
use snip_storage::{BlobStore, StorageError};
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tracing::instrument;
use uuid::Uuid;

/// Maximum title length in characters.
const MAX_TITLE_CHARS: usize = 255;

/// Blob store key for a paste version.
///
/// Every version writes a fresh immutable key, so readers never observe a
/// half-written body and the version-keyed cache never aliases content.
pub fn blob_key(paste_id: Uuid, version: i64) -> String {
    format!("pastes/{paste_id}/v{version}")
}

/// Orchestrates paste persistence and consistency.
pub struct PasteService {
    storage: Arc<dyn BlobStore>,
    store: Arc<dyn PasteStore>,
    cache: Arc<dyn PasteCache>,
    locks: Arc<dyn LockManager>,
    tokens: TokenService,
    codec: ContentCodec,
    max_content_bytes: usize,
    cache_ttl: Duration,
    lock_wait: Duration,
    purge_batch_size: u32,
    retention: Option<time::Duration>,
}

impl PasteService {
    /// Assemble the service from configuration and injected backends.
    pub fn new(
        config: &AppConfig,
        storage: Arc<dyn BlobStore>,
        store: Arc<dyn PasteStore>,
        cache: Arc<dyn PasteCache>,
        locks: Arc<dyn LockManager>,
    ) -> Self {
        Self {
            storage,
            store,
            cache,
            locks,
            tokens: TokenService::new(),
            codec: ContentCodec::new(config.paste.compression),
            max_content_bytes: config.paste.max_content_bytes,
            cache_ttl: config.paste.cache_ttl(),
            lock_wait: config.paste.lock_wait(),
            purge_batch_size: config.sweeper.batch_size,
            retention: config.sweeper.retention(),
        }
    }

    /// Create a paste, returning it together with its one-time plaintext
    /// edit and delete tokens.
    #[instrument(skip(self, new_paste), fields(size = new_paste.content.len()))]
    pub async fn create(&self, new_paste: NewPaste) -> PasteResult<CreatedPaste> {
        let title = validate_title(&new_paste.title)?;
        self.validate_content_size(&new_paste.content)?;

        let paste_id = Uuid::new_v4();
        let now = OffsetDateTime::now_utc();
        let content = new_paste.content;

        let checksum = ContentHash::compute(content.as_bytes()).to_hex();
        let (blob, compressed) = self.codec.compress(content.as_bytes()).await?;
        let key = blob_key(paste_id, 1);
        self.storage.put(&key, blob).await?;

        let edit_token = self.tokens.generate();
        let delete_token = self.tokens.generate();

        let row = PasteRow {
            paste_id,
            title,
            content_language: new_paste.content_language,
            blob_key: key.clone(),
            size_bytes: content.len() as i64,
            compressed,
            checksum,
            version: 1,
            edit_token_hash: edit_token.hash,
            delete_token_hash: delete_token.hash,
            created_at: now,
            updated_at: None,
            expires_at: new_paste.expires_at.map(to_utc),
            deleted_at: None,
        };

        if let Err(e) = self.store.insert_paste(&row).await {
            // The blob is orphaned without its record; clean it up before
            // surfacing the failure.
            if let Err(del) = self.storage.delete(&key).await {
                tracing::warn!(%paste_id, error = %del, "Failed to remove orphaned blob");
            }
            return Err(e.into());
        }

        tracing::info!(%paste_id, compressed, "Paste created");
        Ok(CreatedPaste {
            paste: paste_from_row(row, content),
            edit_token: edit_token.plaintext,
            delete_token: delete_token.plaintext,
        })
    }

    /// Read a paste. Never locks; may serve a momentarily stale cached
    /// value relative to an in-flight edit.
    #[instrument(skip(self))]
    pub async fn get(&self, paste_id: Uuid) -> PasteResult<Paste> {
        let row = self
            .store
            .get_paste(paste_id)
            .await?
            .ok_or(PasteError::NotFound(paste_id))?;
        self.check_guards(&row)?;

        let key = CacheKey::new(paste_id, row.version);
        match self.cache.get(&key).await {
            Ok(Some(entry)) => {
                tracing::debug!(%paste_id, version = row.version, "Cache hit");
                return Ok(paste_from_entry(paste_id, row.version, entry));
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(%paste_id, error = %e, "Cache read failed"),
        }

        let content = self.load_content(&row).await?;

        let entry = CacheEntry {
            title: row.title.clone(),
            content_language: row.content_language.clone(),
            content: content.clone(),
            size_bytes: row.size_bytes,
            created_at: row.created_at,
            updated_at: row.updated_at,
            expires_at: row.expires_at,
        };
        if let Err(e) = self.cache.put(&key, entry, self.cache_ttl).await {
            tracing::warn!(%paste_id, error = %e, "Cache write failed");
        }

        Ok(paste_from_row(row, content))
    }

    /// Edit a paste. Requires the edit token issued at creation.
    #[instrument(skip(self, update, edit_token))]
    pub async fn update(
        &self,
        paste_id: Uuid,
        update: UpdatePaste,
        edit_token: &str,
    ) -> PasteResult<Paste> {
        if update.is_empty() {
            return Err(PasteError::Validation("no fields to update".to_string()));
        }
        if let Some(content) = &update.content {
            self.validate_content_size(content)?;
        }
        let mut update = update;
        if let Some(title) = update.title.take() {
            update.title = Some(validate_title(&title)?);
        }

        let row = match self.store.get_paste(paste_id).await? {
            Some(row) => row,
            None => {
                let _ = self.tokens.verify_dummy(edit_token);
                return Err(PasteError::Unauthorized);
            }
        };
        if !self.tokens.verify(edit_token, &row.edit_token_hash) {
            return Err(PasteError::Unauthorized);
        }
        self.check_guards(&row)?;

        let guard = self.acquire(paste_id).await?;
        let result = self.update_under_lease(paste_id, update).await;
        if let Err(e) = guard.release().await {
            tracing::warn!(%paste_id, error = %e, "Failed to release lease after update");
        }
        result
    }

    async fn update_under_lease(
        &self,
        paste_id: Uuid,
        update: UpdatePaste,
    ) -> PasteResult<Paste> {
        // Re-read under the lease: the pre-lock row may be stale.
        let row = self
            .store
            .get_paste(paste_id)
            .await?
            .ok_or(PasteError::NotFound(paste_id))?;
        self.check_guards(&row)?;

        let observed_version = row.version;
        let now = OffsetDateTime::now_utc();

        let mut updated = row.clone();
        updated.version = observed_version + 1;
        updated.updated_at = Some(now);
        if let Some(title) = update.title {
            updated.title = title;
        }
        if let Some(language) = update.content_language {
            updated.content_language = language;
        }
        if let Some(expires_at) = update.expires_at {
            updated.expires_at = expires_at.map(to_utc);
        }

        let mut new_content = None;
        if let Some(content) = update.content {
            let checksum = ContentHash::compute(content.as_bytes()).to_hex();
            let (blob, compressed) = self.codec.compress(content.as_bytes()).await?;
            let key = blob_key(paste_id, updated.version);
            self.storage.put(&key, blob).await?;

            updated.blob_key = key;
            updated.size_bytes = content.len() as i64;
            updated.compressed = compressed;
            updated.checksum = checksum;
            new_content = Some(content);
        }

        if let Err(e) = self.store.update_paste(&updated, observed_version).await {
            if new_content.is_some() {
                if let Err(del) = self.storage.delete(&updated.blob_key).await {
                    tracing::warn!(%paste_id, error = %del, "Failed to remove orphaned blob");
                }
            }
            return Err(e.into());
        }

        // The record now points at the new version; retire the old cache
        // entry and, when the body changed, the superseded blob.
        if let Err(e) = self
            .cache
            .invalidate(&CacheKey::new(paste_id, observed_version))
            .await
        {
            tracing::warn!(%paste_id, error = %e, "Cache invalidation failed");
        }
        if new_content.is_some() && row.blob_key != updated.blob_key {
            if let Err(e) = self.storage.delete(&row.blob_key).await {
                tracing::warn!(%paste_id, error = %e, "Failed to remove superseded blob");
            }
        }

        tracing::info!(%paste_id, version = updated.version, "Paste updated");

        let content = match new_content {
            Some(content) => content,
            None => self.load_content(&updated).await?,
        };
        Ok(paste_from_row(updated, content))
    }

    /// Soft-delete a paste. Requires the delete token issued at creation.
    /// The record stays until the retention window lapses and the sweeper
    /// purges it.
    #[instrument(skip(self, delete_token))]
    pub async fn soft_delete(&self, paste_id: Uuid, delete_token: &str) -> PasteResult<()> {
        let row = match self.store.get_paste(paste_id).await? {
            Some(row) => row,
            None => {
                let _ = self.tokens.verify_dummy(delete_token);
                return Err(PasteError::Unauthorized);
            }
        };
        if !self.tokens.verify(delete_token, &row.delete_token_hash) {
            return Err(PasteError::Unauthorized);
        }
        self.check_guards(&row)?;

        let guard = self.acquire(paste_id).await?;
        let result = self.soft_delete_under_lease(paste_id).await;
        if let Err(e) = guard.release().await {
            tracing::warn!(%paste_id, error = %e, "Failed to release lease after delete");
        }
        result
    }

    async fn soft_delete_under_lease(&self, paste_id: Uuid) -> PasteResult<()> {
        let row = self
            .store
            .get_paste(paste_id)
            .await?
            .ok_or(PasteError::NotFound(paste_id))?;
        self.check_guards(&row)?;

        let observed_version = row.version;
        let now = OffsetDateTime::now_utc();

        let mut updated = row;
        updated.version = observed_version + 1;
        updated.updated_at = Some(now);
        updated.deleted_at = Some(now);
        self.store.update_paste(&updated, observed_version).await?;

        if let Err(e) = self
            .cache
            .invalidate(&CacheKey::new(paste_id, observed_version))
            .await
        {
            tracing::warn!(%paste_id, error = %e, "Cache invalidation failed");
        }

        tracing::info!(%paste_id, "Paste soft-deleted");
        Ok(())
    }

    /// Purge expired pastes and soft-deleted pastes past the retention
    /// window. A failure on one record is logged and does not abort the
    /// sweep.
    #[instrument(skip(self))]
    pub async fn purge_expired(&self) -> PasteResult<PurgeStats> {
        let mut stats = PurgeStats::default();
        let now = OffsetDateTime::now_utc();

        loop {
            let batch = self.store.expired_pastes(now, self.purge_batch_size).await?;
            if batch.is_empty() {
                break;
            }
            let purged_before = stats.purged;
            for row in &batch {
                self.purge_one(row, &mut stats).await;
            }
            // Records that failed or were busy stay in the scan; stop once a
            // pass makes no progress instead of spinning on them.
            if stats.purged == purged_before {
                break;
            }
        }

        if let Some(retention) = self.retention {
            let cutoff = now - retention;
            loop {
                let batch = self
                    .store
                    .soft_deleted_before(cutoff, self.purge_batch_size)
                    .await?;
                if batch.is_empty() {
                    break;
                }
                let purged_before = stats.purged;
                for row in &batch {
                    self.purge_one(row, &mut stats).await;
                }
                if stats.purged == purged_before {
                    break;
                }
            }
        }

        if stats.scanned > 0 {
            tracing::info!(
                scanned = stats.scanned,
                purged = stats.purged,
                skipped = stats.skipped,
                errors = stats.errors,
                "Purge pass finished"
            );
        }
        Ok(stats)
    }

    /// Purge a single record under its lease, tolerating per-record
    /// failures.
    async fn purge_one(&self, row: &PasteRow, stats: &mut PurgeStats) {
        stats.scanned += 1;
        let paste_id = row.paste_id;

        let guard = match self.acquire(paste_id).await {
            Ok(guard) => guard,
            Err(PasteError::Busy(_)) => {
                tracing::debug!(%paste_id, "Paste lease held, skipping purge");
                stats.skipped += 1;
                return;
            }
            Err(e) => {
                tracing::error!(%paste_id, error = %e, "Failed to lock paste for purge");
                stats.errors += 1;
                return;
            }
        };

        // Blob first: if this fails the record survives and the next pass
        // retries, so no blob is ever orphaned by a half-purge.
        let outcome = async {
            self.storage.delete(&row.blob_key).await?;
            self.store.delete_paste(paste_id).await?;
            Ok::<(), PasteError>(())
        }
        .await;

        match outcome {
            Ok(()) => {
                if let Err(e) = self
                    .cache
                    .invalidate(&CacheKey::new(paste_id, row.version))
                    .await
                {
                    tracing::warn!(%paste_id, error = %e, "Cache invalidation failed");
                }
                tracing::debug!(%paste_id, "Paste purged");
                stats.purged += 1;
            }
            Err(e) => {
                tracing::error!(%paste_id, error = %e, "Failed to purge paste");
                stats.errors += 1;
            }
        }

        if let Err(e) = guard.release().await {
            tracing::warn!(%paste_id, error = %e, "Failed to release lease after purge");
        }
    }

    /// Count pastes that are currently live.
    pub async fn active_paste_count(&self) -> PasteResult<u64> {
        Ok(self
            .store
            .count_active_pastes(OffsetDateTime::now_utc())
            .await?)
    }

    /// Reject reads and mutations of retired records.
    fn check_guards(&self, row: &PasteRow) -> PasteResult<()> {
        if row.is_deleted() {
            return Err(PasteError::Deleted(row.paste_id));
        }
        if row.is_expired(OffsetDateTime::now_utc()) {
            return Err(PasteError::Expired(row.paste_id));
        }
        Ok(())
    }

    /// Acquire the paste's lease, wrapped so every exit path releases it.
    async fn acquire(&self, paste_id: Uuid) -> PasteResult<LeaseGuard> {
        let lease = self
            .locks
            .acquire(&paste_id.to_string(), self.lock_wait)
            .await?;
        Ok(LeaseGuard::new(self.locks.clone(), lease))
    }

    /// Fetch, decompress, and checksum-verify a record's content.
    async fn load_content(&self, row: &PasteRow) -> PasteResult<String> {
        let blob = self.storage.get(&row.blob_key).await?;
        let bytes = self.codec.decompress(&blob, row.compressed).await?;

        let actual = ContentHash::compute(&bytes).to_hex();
        if actual != row.checksum {
            return Err(StorageError::HashMismatch {
                expected: row.checksum.clone(),
                actual,
            }
            .into());
        }

        String::from_utf8(bytes.to_vec()).map_err(|_| PasteError::Codec(CodecError::InvalidUtf8))
    }

    fn validate_content_size(&self, content: &str) -> PasteResult<()> {
        if content.len() > self.max_content_bytes {
            return Err(PasteError::Validation(format!(
                "content size {} exceeds maximum {} bytes",
                content.len(),
                self.max_content_bytes
            )));
        }
        Ok(())
    }
}

fn validate_title(title: &str) -> PasteResult<String> {
    let title = title.trim();
    if title.is_empty() {
        return Err(PasteError::Validation("title must not be empty".to_string()));
    }
    if title.chars().count() > MAX_TITLE_CHARS {
        return Err(PasteError::Validation(format!(
            "title exceeds {MAX_TITLE_CHARS} characters"
        )));
    }
    Ok(title.to_string())
}

fn to_utc(t: OffsetDateTime) -> OffsetDateTime {
    t.to_offset(time::UtcOffset::UTC)
}

fn paste_from_row(row: PasteRow, content: String) -> Paste {
    Paste {
        id: row.paste_id,
        title: row.title,
        content_language: row.content_language,
        content,
        size_bytes: row.size_bytes,
        version: row.version,
        created_at: row.created_at,
        updated_at: row.updated_at,
        expires_at: row.expires_at,
    }
}

fn paste_from_entry(paste_id: Uuid, version: i64, entry: CacheEntry) -> Paste {
    Paste {
        id: paste_id,
        title: entry.title,
        content_language: entry.content_language,
        content: entry.content,
        size_bytes: entry.size_bytes,
        version,
        created_at: entry.created_at,
        updated_at: entry.updated_at,
        expires_at: entry.expires_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_key_is_versioned() {
        let id = Uuid::new_v4();
        assert_eq!(blob_key(id, 1), format!("pastes/{id}/v1"));
        assert_ne!(blob_key(id, 1), blob_key(id, 2));
    }

    #[test]
    fn test_validate_title() {
        assert_eq!(validate_title("  hello  ").unwrap(), "hello");
        assert!(validate_title("").is_err());
        assert!(validate_title("   ").is_err());
        assert!(validate_title(&"x".repeat(256)).is_err());
        assert!(validate_title(&"x".repeat(255)).is_ok());
    }
}
