//! Wall-clock helpers for wire timestamps.

use std::time::{SystemTime, UNIX_EPOCH};

/// Returns the current time as unix milliseconds.
///
/// Wire timestamps (`createdAt`, `queuedAt`, `lastSyncAt`) are
/// informational; ordering always comes from versions, never from clocks.
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
