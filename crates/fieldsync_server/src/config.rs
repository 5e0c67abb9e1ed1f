//! Operating limits and policies of the sync service.

use crate::conflict::ConflictPolicy;
use std::time::Duration;

/// Behavior knobs for [`crate::SyncService`].
///
/// The batch caps bound what a single request can cost; retention bounds
/// how far back the change log reaches before devices must fall back to a
/// full resync.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Create the server directory when it does not exist yet.
    pub create_if_missing: bool,
    /// Fsync the journal after every append.
    pub sync_on_write: bool,
    /// Cap on change records in one pull page.
    pub max_pull_batch: usize,
    /// Cap on outbox entries in one push request.
    pub max_push_batch: usize,
    /// Age at which the sweep may purge a change record.
    pub retention: Duration,
    /// Policy the push path resolves conflicts under.
    pub conflict_policy: ConflictPolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            sync_on_write: true,
            max_pull_batch: 1000,
            max_push_batch: 1000,
            retention: Duration::from_secs(30 * 24 * 60 * 60),
            conflict_policy: ConflictPolicy::ServerWins,
        }
    }
}

impl ServerConfig {
    /// Overrides the pull page cap.
    #[must_use]
    pub const fn with_max_pull_batch(mut self, size: usize) -> Self {
        self.max_pull_batch = size;
        self
    }

    /// Overrides the push batch cap.
    #[must_use]
    pub const fn with_max_push_batch(mut self, size: usize) -> Self {
        self.max_push_batch = size;
        self
    }

    /// Overrides the retention horizon.
    #[must_use]
    pub const fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Overrides the conflict policy.
    #[must_use]
    pub const fn with_conflict_policy(mut self, policy: ConflictPolicy) -> Self {
        self.conflict_policy = policy;
        self
    }

    /// The retention horizon in milliseconds.
    #[must_use]
    pub fn retention_millis(&self) -> u64 {
        u64::try_from(self.retention.as_millis()).unwrap_or(u64::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_keep_a_month_of_history() {
        let config = ServerConfig::default();
        assert_eq!(config.retention, Duration::from_secs(30 * 24 * 60 * 60));
        assert_eq!(config.max_pull_batch, 1000);
        assert_eq!(config.conflict_policy, ConflictPolicy::ServerWins);
    }

    #[test]
    fn overrides_compose() {
        let config = ServerConfig::default()
            .with_max_pull_batch(25)
            .with_max_push_batch(75)
            .with_retention(Duration::from_secs(7200))
            .with_conflict_policy(ConflictPolicy::LastWriteWins);

        assert_eq!(config.max_pull_batch, 25);
        assert_eq!(config.max_push_batch, 75);
        assert_eq!(config.retention_millis(), 7_200_000);
        assert_eq!(config.conflict_policy, ConflictPolicy::LastWriteWins);
    }
}
