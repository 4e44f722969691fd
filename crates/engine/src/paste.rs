//! Public paste types exchanged with the engine's caller.

use time::OffsetDateTime;
use uuid::Uuid;

/// A paste as served to the caller.
#[derive(Clone, Debug)]
pub struct Paste {
    pub id: Uuid,
    pub title: String,
    pub content_language: String,
    pub content: String,
    /// Size of the uncompressed content in bytes.
    pub size_bytes: i64,
    pub version: i64,
    pub created_at: OffsetDateTime,
    pub updated_at: Option<OffsetDateTime>,
    pub expires_at: Option<OffsetDateTime>,
}

/// Input for creating a paste.
#[derive(Clone, Debug)]
pub struct NewPaste {
    pub title: String,
    pub content_language: String,
    pub content: String,
    /// None means the paste never expires. A timestamp in the past is
    /// accepted; the paste is simply born expired.
    pub expires_at: Option<OffsetDateTime>,
}

/// Input for editing a paste. Only the provided fields change; the version
/// bumps either way.
#[derive(Clone, Debug, Default)]
pub struct UpdatePaste {
    pub content: Option<String>,
    pub title: Option<String>,
    pub content_language: Option<String>,
    /// `Some(None)` clears the expiry, `Some(Some(t))` reschedules it,
    /// `None` leaves it untouched.
    pub expires_at: Option<Option<OffsetDateTime>>,
}

impl UpdatePaste {
    /// Whether this update changes anything at all.
    pub fn is_empty(&self) -> bool {
        self.content.is_none()
            && self.title.is_none()
            && self.content_language.is_none()
            && self.expires_at.is_none()
    }
}

/// Result of creating a paste: the paste plus its one-time plaintext
/// capability tokens. The tokens are not recoverable afterwards.
#[derive(Clone, Debug)]
pub struct CreatedPaste {
    pub paste: Paste,
    pub edit_token: String,
    pub delete_token: String,
}

/// Outcome of a purge pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PurgeStats {
    /// Records the scans returned.
    pub scanned: u64,
    /// Records fully removed (blob and row).
    pub purged: u64,
    /// Records skipped because their lease was held.
    pub skipped: u64,
    /// Records whose removal failed; they stay for the next pass.
    pub errors: u64,
}
