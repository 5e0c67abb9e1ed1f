//! Failures surfaced by backends and the journal.

use std::io;
use thiserror::Error;

/// Result alias used throughout the storage crate.
pub type StorageResult<T> = Result<T, StorageError>;

/// What can go wrong below the record layer.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The operating system refused an I/O operation.
    #[error("journal I/O: {0}")]
    Io(#[from] io::Error),

    /// A read was requested outside the written range.
    #[error("read of {len} bytes at offset {offset} exceeds size {size}")]
    ReadPastEnd {
        /// Offset the read started at.
        offset: u64,
        /// Number of bytes requested.
        len: usize,
        /// Size of the store at the time of the read.
        size: u64,
    },

    /// A complete frame failed structural validation.
    #[error("corrupt journal: {0}")]
    Corrupted(String),

    /// A frame's stored checksum disagrees with its contents.
    #[error("frame checksum mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    ChecksumMismatch {
        /// Checksum carried in the frame trailer.
        stored: u32,
        /// Checksum recomputed from the frame bytes.
        computed: u32,
    },
}

impl StorageError {
    /// Builds a [`StorageError::Corrupted`] from any message.
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted(message.into())
    }
}
