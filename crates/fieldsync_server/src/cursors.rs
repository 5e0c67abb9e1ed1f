//! Per-device cursor tracking.

use fieldsync_protocol::SyncCursor;
use std::collections::HashMap;

/// Tracks every device's position in the change log.
///
/// Plain map with no locks of its own; the service serializes access.
/// All mutation goes through [`advance`](Self::advance) and
/// [`repair`](Self::repair), both of which delegate to
/// [`SyncCursor::advance_to`], so a cursor can never move backward.
#[derive(Debug, Default)]
pub struct CursorManager {
    cursors: HashMap<String, SyncCursor>,
}

impl CursorManager {
    /// Creates an empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cursor for a device, creating one at version 0 on
    /// first contact. The flag is true when the cursor was created.
    pub fn get_or_create(&mut self, device_id: &str, now: u64) -> (SyncCursor, bool) {
        if let Some(cursor) = self.cursors.get(device_id) {
            return (cursor.clone(), false);
        }

        let mut cursor = SyncCursor::new(device_id);
        cursor.last_sync_at = now;
        self.cursors.insert(device_id.to_string(), cursor.clone());
        (cursor, true)
    }

    /// Returns the cursor for a device, if it has synced before.
    #[must_use]
    pub fn get(&self, device_id: &str) -> Option<&SyncCursor> {
        self.cursors.get(device_id)
    }

    /// Advances a device's cursor to `max(current, version)`, creating
    /// it first if needed. Returns the cursor and whether the version
    /// moved.
    pub fn advance(&mut self, device_id: &str, version: u64, now: u64) -> (SyncCursor, bool) {
        let cursor = self
            .cursors
            .entry(device_id.to_string())
            .or_insert_with(|| SyncCursor::new(device_id));
        let moved = cursor.advance_to(version, now);
        (cursor.clone(), moved)
    }

    /// Forces a device's cursor to the log head. Used by the repair
    /// endpoint when a device's cursor has fallen pathologically
    /// behind. Same forward-only rule as a normal advance.
    pub fn repair(&mut self, device_id: &str, latest_version: u64, now: u64) -> (SyncCursor, bool) {
        self.advance(device_id, latest_version, now)
    }

    /// Restores a cursor during replay. Later frames for the same
    /// device win, matching journal order.
    pub fn restore(&mut self, cursor: SyncCursor) {
        self.cursors.insert(cursor.device_id.clone(), cursor);
    }

    /// Iterates all cursors in arbitrary order. Used when rewriting the
    /// journal after a sweep.
    pub fn iter(&self) -> impl Iterator<Item = &SyncCursor> {
        self.cursors.values()
    }

    /// Returns the number of known devices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cursors.len()
    }

    /// True when no device has ever synced.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cursors.is_empty()
    }
}
