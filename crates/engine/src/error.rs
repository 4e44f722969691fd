//! Engine error taxonomy.

use snip_lock::LockError;
use snip_metadata::MetadataError;
use snip_storage::StorageError;
use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by paste operations.
///
/// Storage and database failures are surfaced immediately and never retried
/// inside the engine; retry and backoff policy belongs to the caller.
/// `VersionConflict` is likewise surfaced rather than retried: under the
/// lock discipline its occurrence signals a lock-bypass bug that must not be
/// masked.
#[derive(Debug, Error)]
pub enum PasteError {
    #[error("paste not found: {0}")]
    NotFound(Uuid),

    #[error("paste expired: {0}")]
    Expired(Uuid),

    #[error("paste deleted: {0}")]
    Deleted(Uuid),

    /// Token verification failed, or the paste does not exist. The two
    /// cases are deliberately indistinguishable.
    #[error("unauthorized")]
    Unauthorized,

    #[error("version conflict on paste {0}")]
    VersionConflict(String),

    /// The paste's lease could not be acquired within the configured wait.
    #[error("paste busy: {0}")]
    Busy(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("codec error: {0}")]
    Codec(#[from] crate::codec::CodecError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("metadata error: {0}")]
    Metadata(MetadataError),

    #[error("lock error: {0}")]
    Lock(LockError),
}

impl From<MetadataError> for PasteError {
    fn from(e: MetadataError) -> Self {
        match e {
            MetadataError::VersionConflict { paste_id, .. } => Self::VersionConflict(paste_id),
            other => Self::Metadata(other),
        }
    }
}

impl From<LockError> for PasteError {
    fn from(e: LockError) -> Self {
        match e {
            LockError::Busy(key) => Self::Busy(key),
            other => Self::Lock(other),
        }
    }
}

/// Result type for paste operations.
pub type PasteResult<T> = std::result::Result<T, PasteError>;
