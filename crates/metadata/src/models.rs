//! Database models mapping to the paste schema.

use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// A durable paste record.
///
/// `version` starts at 1 and increments by exactly 1 on every successful
/// mutation; `update_paste` enforces this with an optimistic-concurrency
/// check. Token hashes are SHA-256 hex; plaintext tokens never touch the
/// database.
#[derive(Debug, Clone, FromRow)]
pub struct PasteRow {
    pub paste_id: Uuid,
    pub title: String,
    pub content_language: String,
    /// Blob store key of the current version's body.
    pub blob_key: String,
    /// Size of the uncompressed content in bytes.
    pub size_bytes: i64,
    /// Whether the stored blob is compressed.
    pub compressed: bool,
    /// SHA-256 hex of the uncompressed content.
    pub checksum: String,
    pub version: i64,
    pub edit_token_hash: String,
    pub delete_token_hash: String,
    pub created_at: OffsetDateTime,
    pub updated_at: Option<OffsetDateTime>,
    /// NULL means the paste never expires.
    pub expires_at: Option<OffsetDateTime>,
    /// Soft-delete marker; a non-NULL value retires the record until purge.
    pub deleted_at: Option<OffsetDateTime>,
}

impl PasteRow {
    /// Whether the record is past its expiry at `now`.
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    /// Whether the record has been soft-deleted.
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(expires_at: Option<OffsetDateTime>) -> PasteRow {
        PasteRow {
            paste_id: Uuid::new_v4(),
            title: "t".to_string(),
            content_language: "plain_text".to_string(),
            blob_key: "pastes/x/v1".to_string(),
            size_bytes: 2,
            compressed: false,
            checksum: "00".repeat(32),
            version: 1,
            edit_token_hash: "e".to_string(),
            delete_token_hash: "d".to_string(),
            created_at: OffsetDateTime::now_utc(),
            updated_at: None,
            expires_at,
            deleted_at: None,
        }
    }

    #[test]
    fn test_is_expired() {
        let now = OffsetDateTime::now_utc();
        assert!(!row(None).is_expired(now));
        assert!(!row(Some(now + time::Duration::hours(1))).is_expired(now));
        assert!(row(Some(now - time::Duration::seconds(1))).is_expired(now));
        // Expiry boundary is inclusive.
        assert!(row(Some(now)).is_expired(now));
    }
}
