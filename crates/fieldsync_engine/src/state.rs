//! Sync cycle states and outcomes.

use std::time::Duration;

/// The phase the coordinator is currently in.
///
/// A cycle always runs `Idle` → `Pushing` → `Pulling` → `Idle`. Errors
/// return the coordinator to `Idle`; the failure itself is carried in
/// [`SyncStatus::last_error`] rather than a dedicated state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// No cycle is running.
    Idle,
    /// Local outbox entries are being submitted.
    Pushing,
    /// Server changes are being fetched and applied.
    Pulling,
}

impl SyncState {
    /// Returns true if a cycle is in progress.
    pub fn is_active(&self) -> bool {
        matches!(self, SyncState::Pushing | SyncState::Pulling)
    }
}

/// A point-in-time snapshot of the coordinator, published to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncStatus {
    /// Current cycle phase.
    pub state: SyncState,
    /// Whether the coordinator believes it has connectivity.
    pub online: bool,
    /// Outbox entries waiting to be pushed.
    pub pending: usize,
    /// Wall-clock time of the last completed cycle, unix milliseconds.
    pub last_sync_at: Option<u64>,
    /// Message from the last failed cycle, cleared on success.
    pub last_error: Option<String>,
}

impl SyncStatus {
    /// Snapshot of a coordinator that has never synced.
    pub fn initial(online: bool, pending: usize) -> Self {
        Self {
            state: SyncState::Idle,
            online,
            pending,
            last_sync_at: None,
            last_error: None,
        }
    }
}

/// What a requested sync cycle did.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    /// Another cycle held the guard; nothing was done.
    AlreadyRunning,
    /// The coordinator is offline; nothing was done.
    Offline,
    /// A full cycle ran.
    Completed(SyncReport),
}

impl SyncOutcome {
    /// Returns the report when a cycle actually ran.
    pub fn report(&self) -> Option<&SyncReport> {
        match self {
            SyncOutcome::Completed(report) => Some(report),
            _ => None,
        }
    }
}

/// Counters from one completed sync cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncReport {
    /// Outbox entries the server accepted.
    pub pushed: usize,
    /// Outbox entries dropped because the server kept newer state.
    pub conflicts: usize,
    /// Outbox entries the server refused outright; they stay queued.
    pub rejected: usize,
    /// Server changes applied to the local store.
    pub pulled: usize,
    /// Server changes skipped because table or operation was unknown.
    pub skipped: usize,
    /// True when the cycle restarted from an empty store via snapshot.
    pub resynced: bool,
    /// Duration of the cycle.
    pub duration: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_states() {
        assert!(!SyncState::Idle.is_active());
        assert!(SyncState::Pushing.is_active());
        assert!(SyncState::Pulling.is_active());
    }

    #[test]
    fn outcome_report_access() {
        assert!(SyncOutcome::AlreadyRunning.report().is_none());
        assert!(SyncOutcome::Offline.report().is_none());

        let outcome = SyncOutcome::Completed(SyncReport {
            pushed: 2,
            ..SyncReport::default()
        });
        assert_eq!(outcome.report().map(|r| r.pushed), Some(2));
    }

    #[test]
    fn initial_status_is_idle() {
        let status = SyncStatus::initial(true, 3);
        assert_eq!(status.state, SyncState::Idle);
        assert!(status.online);
        assert_eq!(status.pending, 3);
        assert!(status.last_sync_at.is_none());
        assert!(status.last_error.is_none());
    }
}
