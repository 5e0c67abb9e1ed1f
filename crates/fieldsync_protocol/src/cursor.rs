//! Per-device sync cursors.

use serde::{Deserialize, Serialize};

/// A device's position in the change log.
///
/// The cursor version is the highest change-log version the device has
/// durably applied. It only ever moves forward.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncCursor {
    /// The device this cursor belongs to.
    pub device_id: String,
    /// Highest applied change-log version.
    pub version: u64,
    /// Wall-clock time of the last advancement, unix milliseconds.
    pub last_sync_at: u64,
}

impl SyncCursor {
    /// Creates a fresh cursor at version 0.
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            version: 0,
            last_sync_at: 0,
        }
    }

    /// Advances the cursor to `max(current, version)` and stamps
    /// `last_sync_at`.
    ///
    /// Returns true when the version actually moved. Retried or reordered
    /// advancements can never move the cursor backward.
    pub fn advance_to(&mut self, version: u64, now: u64) -> bool {
        self.last_sync_at = now;
        if version > self.version {
            self.version = version;
            true
        } else {
            false
        }
    }
}
