//! Error types for course storage.

use rusqlite::ErrorCode;
use thiserror::Error;

/// Errors that can occur while committing or reading courses.
#[derive(Debug, Error)]
pub enum StorageError {
    /// SQLite returned an error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A course could not be encoded to or decoded from its stored body
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The current record changed between lookup and write
    #[error("Conflicting write: {message}")]
    Conflict { message: String },

    /// A commit did not finish within the configured timeout
    #[error("Commit timed out after {secs}s")]
    Timeout { secs: u64 },

    /// A thread panicked while holding the store lock
    #[error("Store lock poisoned")]
    Poisoned,

    /// The store has been closed
    #[error("Store is closed")]
    Closed,

    /// The blocking commit task failed
    #[error("Commit task failed: {message}")]
    Task { message: String },
}

impl StorageError {
    /// Returns true if this error is potentially transient and retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            StorageError::Conflict { .. } | StorageError::Timeout { .. } => true,
            StorageError::Sqlite(rusqlite::Error::SqliteFailure(e, _)) => {
                matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
            }
            _ => false,
        }
    }
}

impl<T> From<std::sync::PoisonError<T>> for StorageError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        StorageError::Poisoned
    }
}
