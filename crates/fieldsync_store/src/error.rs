//! Error types for the local store.

use std::io;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in local store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] fieldsync_storage::StorageError),

    /// JSON encoding or decoding error.
    #[error("codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Filesystem error outside the journal itself.
    #[error("store I/O: {0}")]
    Io(#[from] io::Error),

    /// The journal holds a record the store cannot interpret.
    #[error("journal corruption: {message}")]
    JournalCorruption {
        /// Description of the corruption.
        message: String,
    },

    /// A record was handed to the store without a usable identifier.
    #[error("invalid record: {message}")]
    InvalidRecord {
        /// Description of the problem.
        message: String,
    },

    /// A lookup named an index the table does not register.
    #[error("unknown index {name:?} on table {table}")]
    UnknownIndex {
        /// The table queried.
        table: String,
        /// The index name requested.
        name: String,
    },

    /// Another process holds the store directory.
    #[error("store locked: another process has exclusive access")]
    StoreLocked,

    /// Invalid store layout or path.
    #[error("invalid store layout: {message}")]
    InvalidLayout {
        /// Description of the layout issue.
        message: String,
    },
}

impl StoreError {
    /// Creates a journal corruption error.
    pub fn journal_corruption(message: impl Into<String>) -> Self {
        Self::JournalCorruption {
            message: message.into(),
        }
    }

    /// Creates an invalid record error.
    pub fn invalid_record(message: impl Into<String>) -> Self {
        Self::InvalidRecord {
            message: message.into(),
        }
    }

    /// Creates an invalid layout error.
    pub fn invalid_layout(message: impl Into<String>) -> Self {
        Self::InvalidLayout {
            message: message.into(),
        }
    }
}
