//! Server journal records and directory management.
//!
//! The server persists everything in one append-only journal:
//!
//! ```text
//! <server_path>/
//! ├─ LOCK              # exclusive-open guard
//! └─ changes.journal   # change records, cursors, retention markers
//! ```
//!
//! Change appends and cursor advances append frames; the retention
//! sweep rewrites the journal to the retained suffix plus the
//! latest-state map and current cursors.

use crate::error::{ServerError, ServerResult};
use fieldsync_protocol::{ChangeRecord, SyncCursor};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";
const JOURNAL_FILE: &str = "changes.journal";

/// Type of server journal record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LogRecordKind {
    /// An appended change record.
    Change = 1,
    /// A device cursor value.
    CursorSet = 2,
    /// The retention purge watermark.
    PurgedThrough = 3,
    /// A latest-state map entry written during compaction.
    Latest = 4,
}

impl LogRecordKind {
    /// Converts a byte to a record kind.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Change),
            2 => Some(Self::CursorSet),
            3 => Some(Self::PurgedThrough),
            4 => Some(Self::Latest),
            _ => None,
        }
    }

    /// Converts the record kind to a byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

/// A server journal record.
///
/// Framed like the store journal: kind byte in the frame header,
/// tagged JSON body as the payload. A mismatch between the two is
/// corruption.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum LogRecord {
    /// An appended change record.
    Change {
        /// The change, version already assigned.
        record: ChangeRecord,
    },

    /// A device cursor value.
    CursorSet {
        /// The cursor after the write.
        cursor: SyncCursor,
    },

    /// The retention purge watermark.
    PurgedThrough {
        /// Highest purged version.
        version: u64,
    },

    /// A latest-state map entry, written during compaction so conflict
    /// detection and snapshots survive the purge of old changes.
    Latest {
        /// The newest change for one record, tombstones included.
        record: ChangeRecord,
    },
}

impl LogRecord {
    /// Returns the record kind.
    #[must_use]
    pub fn kind(&self) -> LogRecordKind {
        match self {
            Self::Change { .. } => LogRecordKind::Change,
            Self::CursorSet { .. } => LogRecordKind::CursorSet,
            Self::PurgedThrough { .. } => LogRecordKind::PurgedThrough,
            Self::Latest { .. } => LogRecordKind::Latest,
        }
    }

    /// Serializes the record body (without the frame envelope).
    pub fn encode_payload(&self) -> ServerResult<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| ServerError::journal_corruption(format!("unencodable record: {e}")))
    }

    /// Deserializes a record from its frame kind and body.
    pub fn decode_payload(kind: u8, payload: &[u8]) -> ServerResult<Self> {
        let kind = LogRecordKind::from_byte(kind)
            .ok_or_else(|| ServerError::journal_corruption(format!("unknown record kind: {kind}")))?;

        let record: Self = serde_json::from_slice(payload)
            .map_err(|e| ServerError::journal_corruption(format!("undecodable record body: {e}")))?;

        if record.kind() != kind {
            return Err(ServerError::journal_corruption(format!(
                "record kind mismatch: frame says {}, body says {}",
                kind.as_byte(),
                record.kind().as_byte()
            )));
        }

        Ok(record)
    }
}

/// A locked server directory.
///
/// The lock is exclusive and advisory; it falls away with the handle.
#[derive(Debug)]
pub struct ServerDir {
    path: PathBuf,
    _lock: File,
}

impl ServerDir {
    /// Opens the server directory at `path`, locking it.
    ///
    /// # Errors
    ///
    /// Fails with [`ServerError::ServerLocked`] when another process holds
    /// the directory, and with a layout error when `path` is missing (and
    /// `create_if_missing` is off) or is not a directory.
    pub fn open(path: &Path, create_if_missing: bool) -> ServerResult<Self> {
        match (path.exists(), create_if_missing) {
            (false, true) => fs::create_dir_all(path)?,
            (false, false) => {
                return Err(ServerError::invalid_layout(format!(
                    "no server directory at {}",
                    path.display()
                )))
            }
            (true, _) if !path.is_dir() => {
                return Err(ServerError::invalid_layout(format!(
                    "{} is not a directory",
                    path.display()
                )))
            }
            (true, _) => {}
        }

        let lock = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;
        if lock.try_lock_exclusive().is_err() {
            return Err(ServerError::ServerLocked);
        }

        Ok(Self {
            path: path.to_path_buf(),
            _lock: lock,
        })
    }

    /// Root directory of the server.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Location of the change journal inside the directory.
    #[must_use]
    pub fn journal_path(&self) -> PathBuf {
        self.path.join(JOURNAL_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldsync_protocol::{Operation, Table};
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn record_round_trip() {
        let record = LogRecord::Change {
            record: ChangeRecord::new(
                Table::WorkOrders,
                "wo-1",
                Operation::Insert,
                Some(json!({"id": "wo-1"})),
                3,
                1_000,
            ),
        };

        let bytes = record.encode_payload().unwrap();
        let decoded = LogRecord::decode_payload(record.kind().as_byte(), &bytes).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn kind_mismatch_is_corruption() {
        let record = LogRecord::PurgedThrough { version: 7 };
        let bytes = record.encode_payload().unwrap();

        let result = LogRecord::decode_payload(LogRecordKind::Change.as_byte(), &bytes);
        assert!(matches!(result, Err(ServerError::JournalCorruption { .. })));
    }

    #[test]
    fn the_directory_lock_is_exclusive() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("server");

        let _held = ServerDir::open(&path, true).unwrap();
        assert!(matches!(
            ServerDir::open(&path, true),
            Err(ServerError::ServerLocked)
        ));
    }

    #[test]
    fn the_journal_lives_inside_the_directory() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("server");

        let dir = ServerDir::open(&path, true).unwrap();
        assert_eq!(dir.path(), path);
        assert_eq!(dir.journal_path(), path.join("changes.journal"));
    }
}
