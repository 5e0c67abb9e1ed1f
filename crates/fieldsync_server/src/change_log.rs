//! The append-only change log.

use fieldsync_protocol::{ChangeRecord, Table};
use std::collections::HashMap;

/// In-memory view of the change log.
///
/// The log maintains:
/// - Retained changes in version order
/// - The next version to assign
/// - The latest change per record, tombstones included, which survives
///   retention sweeps so conflict detection and snapshots keep working
/// - The purge watermark, below which history is gone
///
/// The struct takes no locks of its own. The service serializes every
/// version assignment behind one write lock, which is what makes
/// versions dense and monotonic.
#[derive(Debug, Default)]
pub struct ChangeLog {
    /// Retained changes, ascending by version.
    entries: Vec<ChangeRecord>,
    /// Newest change per `(table, record_id)`, deletes included.
    latest: HashMap<(Table, String), ChangeRecord>,
    /// Highest version assigned so far.
    last_version: u64,
    /// Versions at or below this have been purged by retention.
    purged_through: u64,
}

impl ChangeLog {
    /// Creates an empty log. The first assigned version is 1.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the version the next appended change will receive.
    ///
    /// The counter only moves when [`record`](Self::record) commits the
    /// change, so a failed durability write does not burn a version.
    #[must_use]
    pub fn next_version(&self) -> u64 {
        self.last_version + 1
    }

    /// Returns the highest assigned version, 0 when nothing was ever
    /// appended.
    #[must_use]
    pub fn latest_version(&self) -> u64 {
        self.last_version
    }

    /// Returns the purge watermark.
    #[must_use]
    pub fn purged_through(&self) -> u64 {
        self.purged_through
    }

    /// Commits a change to the log.
    ///
    /// The record's version must be the value [`Self::next_version`]
    /// returned; during replay it may be any value above the current
    /// latest. Updates the latest-state map.
    pub fn record(&mut self, record: ChangeRecord) {
        debug_assert!(record.version > self.last_version);
        self.last_version = record.version;
        self.latest.insert(record.key(), record.clone());
        self.entries.push(record);
    }

    /// Restores a latest-state entry during replay.
    ///
    /// Latest entries describe changes whose log rows were purged, so
    /// they bump the version counter without growing `entries`.
    pub fn seed_latest(&mut self, record: ChangeRecord) {
        if record.version > self.last_version {
            self.last_version = record.version;
        }
        self.latest.insert(record.key(), record);
    }

    /// Restores the purge watermark during replay.
    pub fn set_purged_through(&mut self, version: u64) {
        if version > self.purged_through {
            self.purged_through = version;
        }
        if version > self.last_version {
            self.last_version = version;
        }
    }

    /// Returns up to `limit` changes with version greater than `since`,
    /// plus whether more remain past the returned page.
    pub fn changes_since(&self, since: u64, limit: usize) -> (Vec<ChangeRecord>, bool) {
        let start = self.entries.partition_point(|r| r.version <= since);
        let remaining = self.entries.len() - start;
        let page = self.entries[start..start + remaining.min(limit)].to_vec();
        (page, remaining > limit)
    }

    /// True when a device reading from `since` would miss purged
    /// history and must fall back to a full resync.
    #[must_use]
    pub fn needs_full_resync(&self, since: u64) -> bool {
        since < self.purged_through
    }

    /// Returns the changes for one record with version in
    /// `(since, upper]`.
    ///
    /// When the range predates retained history, falls back to the
    /// latest-state map so a conflict is still visible after its log
    /// rows were purged.
    pub fn intervening(&self, key: &(Table, String), since: u64, upper: u64) -> Vec<ChangeRecord> {
        let start = self.entries.partition_point(|r| r.version <= since);
        let mut found: Vec<ChangeRecord> = self.entries[start..]
            .iter()
            .take_while(|r| r.version <= upper)
            .filter(|r| r.table == key.0 && r.record_id == key.1)
            .cloned()
            .collect();

        if found.is_empty() && since < self.purged_through {
            if let Some(latest) = self.latest.get(key) {
                if latest.version > since && latest.version <= upper {
                    found.push(latest.clone());
                }
            }
        }

        found
    }

    /// Purges changes older than `cutoff` (unix milliseconds, by
    /// `created_at`). Returns the number removed.
    ///
    /// Appends happen under one writer, so `created_at` is
    /// non-decreasing along the log and the purge is a prefix. The
    /// latest-state map is untouched; records whose newest change was
    /// purged stay visible through it.
    pub fn sweep_before(&mut self, cutoff: u64) -> usize {
        let keep_from = self
            .entries
            .iter()
            .take_while(|r| r.created_at < cutoff)
            .count();
        if keep_from == 0 {
            return 0;
        }

        self.purged_through = self.entries[keep_from - 1].version;
        self.entries.drain(..keep_from);
        keep_from
    }

    /// Returns the latest-state entries that are not deletes, ascending
    /// by version. This is the record set a full resync serves.
    pub fn snapshot(&self) -> Vec<ChangeRecord> {
        let mut live: Vec<ChangeRecord> = self
            .latest
            .values()
            .filter(|r| !r.is_delete())
            .cloned()
            .collect();
        live.sort_by_key(|r| r.version);
        live
    }

    /// Returns up to `limit` snapshot entries with version greater than
    /// `since`, plus whether more remain.
    pub fn snapshot_since(&self, since: u64, limit: usize) -> (Vec<ChangeRecord>, bool) {
        let live = self.snapshot();
        let start = live.partition_point(|r| r.version <= since);
        let remaining = live.len() - start;
        let page = live[start..start + remaining.min(limit)].to_vec();
        (page, remaining > limit)
    }

    /// Returns every retained change, ascending by version. Used when
    /// rewriting the journal after a sweep.
    pub fn retained(&self) -> &[ChangeRecord] {
        &self.entries
    }

    /// Returns every latest-state entry, deletes included, ascending by
    /// version. Used when rewriting the journal after a sweep.
    pub fn latest_entries(&self) -> Vec<ChangeRecord> {
        let mut all: Vec<ChangeRecord> = self.latest.values().cloned().collect();
        all.sort_by_key(|r| r.version);
        all
    }

    /// Returns the number of retained changes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no changes are retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldsync_protocol::Operation;
    use serde_json::json;

    fn change(log: &mut ChangeLog, table: Table, id: &str, created_at: u64) -> u64 {
        let version = log.next_version();
        log.record(ChangeRecord::new(
            table,
            id,
            Operation::Update,
            Some(json!({"id": id, "v": version})),
            version,
            created_at,
        ));
        version
    }

    fn delete(log: &mut ChangeLog, table: Table, id: &str, created_at: u64) -> u64 {
        let version = log.next_version();
        log.record(ChangeRecord::new(
            table,
            id,
            Operation::Delete,
            None,
            version,
            created_at,
        ));
        version
    }

    #[test]
    fn versions_are_dense_and_monotonic() {
        let mut log = ChangeLog::new();
        assert_eq!(log.latest_version(), 0);

        let v1 = change(&mut log, Table::WorkOrders, "wo-1", 10);
        let v2 = change(&mut log, Table::WorkOrders, "wo-2", 10);
        let v3 = change(&mut log, Table::Customers, "c-1", 11);

        assert_eq!((v1, v2, v3), (1, 2, 3));
        assert_eq!(log.latest_version(), 3);
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn changes_since_pages_in_order() {
        let mut log = ChangeLog::new();
        for i in 0..5 {
            change(&mut log, Table::WorkOrders, &format!("wo-{i}"), 10);
        }

        let (page, has_more) = log.changes_since(0, 2);
        assert_eq!(page.len(), 2);
        assert!(has_more);
        assert_eq!(page[0].version, 1);
        assert_eq!(page[1].version, 2);

        let (page, has_more) = log.changes_since(2, 2);
        assert_eq!(page.len(), 2);
        assert!(has_more);
        assert_eq!(page[0].version, 3);

        let (page, has_more) = log.changes_since(4, 2);
        assert_eq!(page.len(), 1);
        assert!(!has_more);
        assert_eq!(page[0].version, 5);

        let (page, has_more) = log.changes_since(5, 2);
        assert!(page.is_empty());
        assert!(!has_more);
    }

    #[test]
    fn has_more_is_false_at_exact_boundary() {
        let mut log = ChangeLog::new();
        for i in 0..3 {
            change(&mut log, Table::WorkOrders, &format!("wo-{i}"), 10);
        }

        let (page, has_more) = log.changes_since(0, 3);
        assert_eq!(page.len(), 3);
        assert!(!has_more);
    }

    #[test]
    fn intervening_filters_by_record_and_range() {
        let mut log = ChangeLog::new();
        let v1 = change(&mut log, Table::WorkOrders, "wo-1", 10);
        change(&mut log, Table::WorkOrders, "wo-2", 10);
        let v3 = change(&mut log, Table::WorkOrders, "wo-1", 11);
        let v4 = change(&mut log, Table::Customers, "wo-1", 12);

        let key = (Table::WorkOrders, "wo-1".to_string());
        let hits = log.intervening(&key, 0, v4);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].version, v1);
        assert_eq!(hits[1].version, v3);

        // Same record id in a different table is a different key.
        let hits = log.intervening(&(Table::Customers, "wo-1".to_string()), 0, v4);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].version, v4);

        // Upper bound excludes later changes.
        let hits = log.intervening(&key, 0, v1);
        assert_eq!(hits.len(), 1);

        // Cursor past the last change sees nothing.
        assert!(log.intervening(&key, v4, v4).is_empty());
    }

    #[test]
    fn sweep_purges_prefix_and_keeps_latest() {
        let mut log = ChangeLog::new();
        change(&mut log, Table::WorkOrders, "wo-old", 100);
        let v2 = change(&mut log, Table::WorkOrders, "wo-old", 150);
        let v3 = change(&mut log, Table::WorkOrders, "wo-new", 900);

        let removed = log.sweep_before(500);
        assert_eq!(removed, 2);
        assert_eq!(log.len(), 1);
        assert_eq!(log.purged_through(), v2);
        assert_eq!(log.latest_version(), v3);

        assert!(log.needs_full_resync(0));
        assert!(log.needs_full_resync(v2 - 1));
        assert!(!log.needs_full_resync(v2));

        // The purged record is still visible through the snapshot.
        let snapshot = log.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].record_id, "wo-old");
        assert_eq!(snapshot[0].version, v2);
    }

    #[test]
    fn intervening_falls_back_to_latest_after_sweep() {
        let mut log = ChangeLog::new();
        change(&mut log, Table::WorkOrders, "wo-1", 100);
        let v2 = change(&mut log, Table::WorkOrders, "wo-1", 150);
        log.sweep_before(500);
        assert!(log.is_empty());

        // A device whose cursor predates the purge still sees the
        // newest change as intervening.
        let key = (Table::WorkOrders, "wo-1".to_string());
        let hits = log.intervening(&key, 0, log.latest_version());
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].version, v2);

        // A device already past it does not.
        assert!(log.intervening(&key, v2, log.latest_version()).is_empty());
    }

    #[test]
    fn snapshot_excludes_tombstones() {
        let mut log = ChangeLog::new();
        change(&mut log, Table::WorkOrders, "wo-1", 10);
        change(&mut log, Table::Customers, "c-1", 10);
        delete(&mut log, Table::WorkOrders, "wo-1", 11);

        let snapshot = log.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].record_id, "c-1");

        // Tombstones stay in the full latest-entry listing.
        assert_eq!(log.latest_entries().len(), 2);
    }

    #[test]
    fn snapshot_since_pages() {
        let mut log = ChangeLog::new();
        for i in 0..4 {
            change(&mut log, Table::Products, &format!("p-{i}"), 10);
        }

        let (page, has_more) = log.snapshot_since(0, 3);
        assert_eq!(page.len(), 3);
        assert!(has_more);

        let last = page.last().unwrap().version;
        let (page, has_more) = log.snapshot_since(last, 3);
        assert_eq!(page.len(), 1);
        assert!(!has_more);
    }

    #[test]
    fn replay_hooks_restore_counter() {
        let mut log = ChangeLog::new();
        log.set_purged_through(4);
        log.seed_latest(ChangeRecord::new(
            Table::WorkOrders,
            "wo-1",
            Operation::Update,
            Some(json!({"id": "wo-1"})),
            3,
            100,
        ));

        // Watermark outranks the seeded version.
        assert_eq!(log.latest_version(), 4);
        assert_eq!(log.next_version(), 5);
        assert!(log.needs_full_resync(2));

        let v = log.next_version();
        change(&mut log, Table::WorkOrders, "wo-2", 200);
        assert_eq!(log.latest_version(), v);
    }
}
