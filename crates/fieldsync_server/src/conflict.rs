//! Conflict detection policy.
//!
//! A client change conflicts when the change log holds records newer
//! than the device's cursor for the same `(table, recordId)`. What
//! happens to a conflicting change is a policy decision made at push
//! time; detection itself is policy-free.

use fieldsync_protocol::{ChangeRecord, OutboxEntry};

/// How the server treats a pushed change that conflicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictPolicy {
    /// Reject the client change; the device converges on its next pull.
    ServerWins,
    /// Append the client change anyway, overriding the server state.
    ClientWins,
    /// Compare timestamps: the client change wins only if it was queued
    /// after the newest intervening server change was created.
    LastWriteWins,
}

impl ConflictPolicy {
    /// Decides whether a conflicting entry should still be appended.
    ///
    /// `intervening` holds the server changes newer than the device's
    /// cursor for the entry's record, ascending by version. Callers
    /// only consult the policy when `intervening` is non-empty.
    #[must_use]
    pub fn accepts(self, entry: &OutboxEntry, intervening: &[ChangeRecord]) -> bool {
        match self {
            Self::ServerWins => false,
            Self::ClientWins => true,
            Self::LastWriteWins => intervening
                .last()
                .is_none_or(|newest| entry.queued_at > newest.created_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldsync_protocol::{Operation, Table};
    use serde_json::json;

    fn entry_queued_at(queued_at: u64) -> OutboxEntry {
        OutboxEntry::mutation(
            1,
            Table::WorkOrders,
            "wo-1",
            Operation::Update,
            json!({"id": "wo-1"}),
            queued_at,
        )
    }

    fn server_change_at(version: u64, created_at: u64) -> ChangeRecord {
        ChangeRecord::new(
            Table::WorkOrders,
            "wo-1",
            Operation::Update,
            Some(json!({"id": "wo-1"})),
            version,
            created_at,
        )
    }

    #[test]
    fn server_wins_rejects() {
        let policy = ConflictPolicy::ServerWins;
        let intervening = [server_change_at(6, 500)];
        assert!(!policy.accepts(&entry_queued_at(9_999), &intervening));
    }

    #[test]
    fn client_wins_accepts() {
        let policy = ConflictPolicy::ClientWins;
        let intervening = [server_change_at(6, 500)];
        assert!(policy.accepts(&entry_queued_at(1), &intervening));
    }

    #[test]
    fn last_write_wins_compares_timestamps() {
        let policy = ConflictPolicy::LastWriteWins;
        let intervening = [server_change_at(6, 500), server_change_at(7, 900)];

        assert!(policy.accepts(&entry_queued_at(1_000), &intervening));
        assert!(!policy.accepts(&entry_queued_at(900), &intervening));
        assert!(!policy.accepts(&entry_queued_at(100), &intervening));
    }
}
