//! Journal record types and serialization.

use crate::error::{StoreError, StoreResult};
use fieldsync_protocol::{OutboxEntry, SyncCursor, Table};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Type of journal record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StoreRecordKind {
    /// Insert or update a cached record.
    EntityPut = 1,
    /// Delete a cached record.
    EntityDelete = 2,
    /// Enqueue an outbox entry.
    OutboxAdd = 3,
    /// Mark an outbox entry as acknowledged.
    OutboxAck = 4,
    /// Drop all acknowledged outbox entries.
    OutboxPurge = 5,
    /// Replace the stored sync cursor.
    CursorSet = 6,
    /// Set a device setting.
    SettingSet = 7,
    /// Drop all cached records, keeping outbox and settings.
    TablesClear = 8,
}

impl StoreRecordKind {
    /// Converts a byte to a record kind.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::EntityPut),
            2 => Some(Self::EntityDelete),
            3 => Some(Self::OutboxAdd),
            4 => Some(Self::OutboxAck),
            5 => Some(Self::OutboxPurge),
            6 => Some(Self::CursorSet),
            7 => Some(Self::SettingSet),
            8 => Some(Self::TablesClear),
            _ => None,
        }
    }

    /// Converts the record kind to a byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

/// A journal record representing one store mutation.
///
/// Records are framed by `fieldsync_storage::Journal` with the kind
/// byte in the frame header and the tagged JSON body as the payload.
/// The tag is redundant with the kind byte; a mismatch between the two
/// is treated as corruption.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum StoreRecord {
    /// Insert or update a cached record.
    EntityPut {
        /// The table holding the record.
        table: Table,
        /// Identifier of the record.
        record_id: String,
        /// Full post-write field set.
        payload: Value,
    },

    /// Delete a cached record.
    EntityDelete {
        /// The table holding the record.
        table: Table,
        /// Identifier of the record.
        record_id: String,
    },

    /// Enqueue an outbox entry.
    OutboxAdd {
        /// The queued entry.
        entry: OutboxEntry,
    },

    /// Mark an outbox entry as acknowledged.
    OutboxAck {
        /// `local_id` of the acknowledged entry.
        local_id: u64,
    },

    /// Drop all outbox entries acknowledged so far.
    OutboxPurge,

    /// Replace the stored sync cursor.
    CursorSet {
        /// The new cursor value.
        cursor: SyncCursor,
    },

    /// Set a device setting.
    SettingSet {
        /// Setting name.
        key: String,
        /// Setting value.
        value: String,
    },

    /// Drop all cached records, keeping outbox and settings.
    ///
    /// Written at the start of a full resync so the wipe survives
    /// journal replay.
    TablesClear,
}

impl StoreRecord {
    /// Returns the record kind.
    #[must_use]
    pub fn kind(&self) -> StoreRecordKind {
        match self {
            Self::EntityPut { .. } => StoreRecordKind::EntityPut,
            Self::EntityDelete { .. } => StoreRecordKind::EntityDelete,
            Self::OutboxAdd { .. } => StoreRecordKind::OutboxAdd,
            Self::OutboxAck { .. } => StoreRecordKind::OutboxAck,
            Self::OutboxPurge => StoreRecordKind::OutboxPurge,
            Self::CursorSet { .. } => StoreRecordKind::CursorSet,
            Self::SettingSet { .. } => StoreRecordKind::SettingSet,
            Self::TablesClear => StoreRecordKind::TablesClear,
        }
    }

    /// Serializes the record body (without the frame envelope).
    pub fn encode_payload(&self) -> StoreResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Deserializes a record from its frame kind and body.
    ///
    /// # Errors
    ///
    /// Returns `JournalCorruption` if the kind byte is unknown or does
    /// not match the decoded body.
    pub fn decode_payload(kind: u8, payload: &[u8]) -> StoreResult<Self> {
        let kind = StoreRecordKind::from_byte(kind)
            .ok_or_else(|| StoreError::journal_corruption(format!("unknown record kind: {kind}")))?;

        let record: Self = serde_json::from_slice(payload)
            .map_err(|e| StoreError::journal_corruption(format!("undecodable record body: {e}")))?;

        if record.kind() != kind {
            return Err(StoreError::journal_corruption(format!(
                "record kind mismatch: frame says {}, body says {}",
                kind.as_byte(),
                record.kind().as_byte()
            )));
        }

        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn kind_bytes_round_trip() {
        for kind in [
            StoreRecordKind::EntityPut,
            StoreRecordKind::EntityDelete,
            StoreRecordKind::OutboxAdd,
            StoreRecordKind::OutboxAck,
            StoreRecordKind::OutboxPurge,
            StoreRecordKind::CursorSet,
            StoreRecordKind::SettingSet,
            StoreRecordKind::TablesClear,
        ] {
            assert_eq!(StoreRecordKind::from_byte(kind.as_byte()), Some(kind));
        }
        assert_eq!(StoreRecordKind::from_byte(0), None);
        assert_eq!(StoreRecordKind::from_byte(200), None);
    }

    #[test]
    fn record_round_trip() {
        let record = StoreRecord::EntityPut {
            table: Table::Customers,
            record_id: "c-1".to_string(),
            payload: json!({"id": "c-1", "name": "Acme"}),
        };

        let bytes = record.encode_payload().unwrap();
        let decoded = StoreRecord::decode_payload(record.kind().as_byte(), &bytes).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn unit_record_round_trip() {
        let record = StoreRecord::OutboxPurge;
        let bytes = record.encode_payload().unwrap();
        let decoded =
            StoreRecord::decode_payload(StoreRecordKind::OutboxPurge.as_byte(), &bytes).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn kind_mismatch_is_corruption() {
        let record = StoreRecord::OutboxAck { local_id: 9 };
        let bytes = record.encode_payload().unwrap();

        let result = StoreRecord::decode_payload(StoreRecordKind::EntityDelete.as_byte(), &bytes);
        assert!(matches!(result, Err(StoreError::JournalCorruption { .. })));
    }

    #[test]
    fn unknown_kind_is_corruption() {
        let result = StoreRecord::decode_payload(99, b"{}");
        assert!(matches!(result, Err(StoreError::JournalCorruption { .. })));
    }
}
