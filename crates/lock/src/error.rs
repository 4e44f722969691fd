//! Lock error types.

use thiserror::Error;

/// Lock operation errors.
#[derive(Debug, Error)]
pub enum LockError {
    /// The lock was held by someone else for the whole acquire timeout.
    #[error("lock busy: {0}")]
    Busy(String),

    /// The lease being released is no longer held (fencing token mismatch
    /// or expiry steal).
    #[error("lease not held: {0}")]
    NotHeld(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl LockError {
    /// Whether this error is the acquire-timeout case.
    pub fn is_busy(&self) -> bool {
        matches!(self, LockError::Busy(_))
    }
}

/// Result type for lock operations.
pub type LockResult<T> = std::result::Result<T, LockError>;
