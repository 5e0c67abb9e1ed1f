//! The local record store.

use crate::config::StoreConfig;
use crate::dir::StoreDir;
use crate::error::{StoreError, StoreResult};
use crate::index::TableIndexes;
use crate::record::StoreRecord;
use fieldsync_protocol::{now_millis, ChangeRecord, Operation, OutboxEntry, SyncCursor, Table};
use fieldsync_storage::{FileBackend, InMemoryBackend, Journal, StorageBackend};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::warn;

/// Settings key under which a device's stable identifier is stored.
pub const DEVICE_ID_KEY: &str = "deviceId";

/// The durable offline store used by one device.
///
/// `LocalStore` caches records per table, maintains the outbox queue
/// of unsynced local writes, and mirrors the device's sync cursor and
/// settings. Every mutation is journaled before it is applied, so the
/// full state is rebuilt by replay on open.
///
/// Local writes through [`put`](Self::put) and [`delete`](Self::delete)
/// enqueue an outbox entry automatically. Writes arriving from the
/// server go through [`apply_change`](Self::apply_change), which
/// bypasses the outbox so pulled changes are never echoed back.
///
/// # Opening a Store
///
/// ```rust,ignore
/// use fieldsync_store::LocalStore;
/// use std::path::Path;
///
/// let store = LocalStore::open(Path::new("device_store"))?;
/// ```
///
/// For tests, `LocalStore::open_in_memory()` creates a non-persistent
/// store.
pub struct LocalStore {
    /// Store directory (holds the lock). None for in-memory stores.
    dir: Option<StoreDir>,
    /// Record journal.
    journal: Journal,
    /// In-memory state, rebuilt from the journal on open.
    state: RwLock<StoreState>,
}

/// Mutable store state.
#[derive(Default)]
struct StoreState {
    /// Cached records per table, keyed by record id.
    tables: BTreeMap<Table, BTreeMap<String, Value>>,
    /// Secondary indexes per table.
    indexes: BTreeMap<Table, TableIndexes>,
    /// Outbox entries keyed by local id (ascending queue order).
    outbox: BTreeMap<u64, OutboxEntry>,
    /// Next outbox local id to assign.
    next_local_id: u64,
    /// Device settings.
    settings: BTreeMap<String, String>,
    /// Mirrored sync cursor.
    cursor: Option<SyncCursor>,
}

impl LocalStore {
    /// Opens a store from a directory path with default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if another process holds the store lock
    /// (`StoreLocked`), the journal is corrupted, or I/O fails.
    pub fn open(path: &Path) -> StoreResult<Self> {
        Self::open_with_config(path, StoreConfig::default())
    }

    /// Opens a store from a directory path with custom configuration.
    pub fn open_with_config(path: &Path, config: StoreConfig) -> StoreResult<Self> {
        let dir = StoreDir::open(path, config.create_if_missing)?;
        let backend = FileBackend::open_with_create_dirs(&dir.journal_path())?;
        Self::replay(Some(dir), Box::new(backend), config)
    }

    /// Opens a store over a pre-configured backend.
    ///
    /// Lower-level constructor for when the journal bytes come from
    /// somewhere other than the standard directory layout. Most callers
    /// want [`open`](Self::open) instead.
    pub fn open_with_backend(
        backend: Box<dyn StorageBackend>,
        config: StoreConfig,
    ) -> StoreResult<Self> {
        Self::replay(None, backend, config)
    }

    /// Opens a fresh in-memory store for testing.
    ///
    /// Data is lost when the store is dropped.
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::open_with_backend(Box::new(InMemoryBackend::new()), StoreConfig::default())
    }

    /// Rebuilds state from the journal.
    fn replay(
        dir: Option<StoreDir>,
        backend: Box<dyn StorageBackend>,
        config: StoreConfig,
    ) -> StoreResult<Self> {
        let journal = Journal::new(backend, config.sync_on_write);

        let recovery = journal.recover()?;
        if recovery.torn_tail {
            warn!(
                valid_len = recovery.valid_len,
                "discarding torn journal tail"
            );
            journal.truncate_to(recovery.valid_len)?;
        }

        let mut state = StoreState {
            next_local_id: 1,
            ..StoreState::default()
        };
        for frame in &recovery.frames {
            let record = StoreRecord::decode_payload(frame.kind, &frame.payload)?;
            state.apply(record);
        }

        Ok(Self {
            dir,
            journal,
            state: RwLock::new(state),
        })
    }

    /// Returns the store directory path, if persistent.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.dir.as_ref().map(StoreDir::path)
    }

    // ---- records ----

    /// Writes a record locally and enqueues it for sync.
    ///
    /// The record id is taken from the payload's `"id"` field. Whether
    /// the queued operation is an insert or an update depends on
    /// whether the id is already cached.
    ///
    /// Returns the record id.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRecord` if the payload has no string `"id"`
    /// field or the table is not a known table.
    pub fn put(&self, table: Table, payload: Value) -> StoreResult<String> {
        require_known(table)?;
        let record_id = payload_id(&payload)?;

        let mut state = self.state.write();

        let exists = state
            .tables
            .get(&table)
            .is_some_and(|records| records.contains_key(&record_id));
        let operation = if exists {
            Operation::Update
        } else {
            Operation::Insert
        };

        let entry = OutboxEntry::mutation(
            state.next_local_id,
            table,
            record_id.clone(),
            operation,
            payload.clone(),
            now_millis(),
        );

        let put_record = StoreRecord::EntityPut {
            table,
            record_id: record_id.clone(),
            payload,
        };
        let add_record = StoreRecord::OutboxAdd { entry };

        self.append(&put_record)?;
        self.append(&add_record)?;
        state.apply(put_record);
        state.apply(add_record);

        Ok(record_id)
    }

    /// Deletes a record locally and enqueues the deletion for sync.
    ///
    /// Deleting an id that is not cached is not an error; the deletion
    /// is still queued so the server copy goes away. Returns whether a
    /// cached record was removed.
    pub fn delete(&self, table: Table, record_id: &str) -> StoreResult<bool> {
        require_known(table)?;

        let mut state = self.state.write();

        let existed = state
            .tables
            .get(&table)
            .is_some_and(|records| records.contains_key(record_id));

        let entry = OutboxEntry::deletion(
            state.next_local_id,
            table,
            record_id.to_string(),
            now_millis(),
        );

        let delete_record = StoreRecord::EntityDelete {
            table,
            record_id: record_id.to_string(),
        };
        let add_record = StoreRecord::OutboxAdd { entry };

        self.append(&delete_record)?;
        self.append(&add_record)?;
        state.apply(delete_record);
        state.apply(add_record);

        Ok(existed)
    }

    /// Applies a change pulled from the server, bypassing the outbox.
    ///
    /// Returns `Ok(true)` when the change was applied and `Ok(false)`
    /// when it targets an unknown table or operation and was skipped.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRecord` for an insert or update carrying no
    /// payload.
    pub fn apply_change(&self, change: &ChangeRecord) -> StoreResult<bool> {
        if !change.table.is_known() || !change.operation.is_known() {
            return Ok(false);
        }

        let record = match change.operation {
            Operation::Insert | Operation::Update => {
                let payload = change.payload.clone().ok_or_else(|| {
                    StoreError::invalid_record(format!(
                        "{} change for {} has no payload",
                        change.operation, change.record_id
                    ))
                })?;
                StoreRecord::EntityPut {
                    table: change.table,
                    record_id: change.record_id.clone(),
                    payload,
                }
            }
            Operation::Delete => StoreRecord::EntityDelete {
                table: change.table,
                record_id: change.record_id.clone(),
            },
            Operation::Unknown => return Ok(false),
        };

        let mut state = self.state.write();
        self.append(&record)?;
        state.apply(record);
        Ok(true)
    }

    /// Reads a cached record.
    #[must_use]
    pub fn get(&self, table: Table, record_id: &str) -> Option<Value> {
        self.state
            .read()
            .tables
            .get(&table)
            .and_then(|records| records.get(record_id))
            .cloned()
    }

    /// Reads all cached records of a table, ascending by record id.
    #[must_use]
    pub fn get_all(&self, table: Table) -> Vec<Value> {
        self.state
            .read()
            .tables
            .get(&table)
            .map(|records| records.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Looks up cached records through a registered index.
    ///
    /// # Errors
    ///
    /// Returns `UnknownIndex` if the table does not register an index
    /// under `index_name`.
    pub fn find_by(&self, table: Table, index_name: &str, value: &str) -> StoreResult<Vec<Value>> {
        let state = self.state.read();

        let Some(indexes) = state.indexes.get(&table) else {
            // No writes to this table yet, but reject bad index names.
            if table.spec().is_some_and(|s| s.indexes.iter().any(|i| i.name == index_name)) {
                return Ok(Vec::new());
            }
            return Err(StoreError::UnknownIndex {
                table: table.to_string(),
                name: index_name.to_string(),
            });
        };

        if !indexes.has_index(index_name) {
            return Err(StoreError::UnknownIndex {
                table: table.to_string(),
                name: index_name.to_string(),
            });
        }

        let records = state.tables.get(&table);
        Ok(indexes
            .lookup(index_name, value)
            .iter()
            .filter_map(|id| records.and_then(|r| r.get(id)).cloned())
            .collect())
    }

    /// Returns the number of cached records per known table.
    #[must_use]
    pub fn table_counts(&self) -> Vec<(Table, usize)> {
        let state = self.state.read();
        Table::KNOWN
            .iter()
            .map(|&table| {
                let count = state.tables.get(&table).map_or(0, BTreeMap::len);
                (table, count)
            })
            .collect()
    }

    /// Drops all cached records, keeping outbox, settings, and cursor.
    ///
    /// Used at the start of a full resync before the snapshot is
    /// re-applied.
    pub fn clear_tables(&self) -> StoreResult<()> {
        let mut state = self.state.write();
        self.append(&StoreRecord::TablesClear)?;
        state.apply(StoreRecord::TablesClear);
        Ok(())
    }

    // ---- outbox ----

    /// Returns unacknowledged outbox entries in queue order.
    #[must_use]
    pub fn pending(&self) -> Vec<OutboxEntry> {
        self.state
            .read()
            .outbox
            .values()
            .filter(|entry| !entry.acknowledged)
            .cloned()
            .collect()
    }

    /// Returns how many outbox entries await acknowledgement.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.state
            .read()
            .outbox
            .values()
            .filter(|entry| !entry.acknowledged)
            .count()
    }

    /// Returns all outbox entries, acknowledged included, in queue order.
    #[must_use]
    pub fn outbox_entries(&self) -> Vec<OutboxEntry> {
        self.state.read().outbox.values().cloned().collect()
    }

    /// Marks an outbox entry as acknowledged by the server.
    ///
    /// Returns whether an unacknowledged entry with this id existed.
    pub fn acknowledge(&self, local_id: u64) -> StoreResult<bool> {
        let mut state = self.state.write();

        let fresh = state
            .outbox
            .get(&local_id)
            .is_some_and(|entry| !entry.acknowledged);
        if !fresh {
            return Ok(false);
        }

        self.append(&StoreRecord::OutboxAck { local_id })?;
        state.apply(StoreRecord::OutboxAck { local_id });
        Ok(true)
    }

    /// Drops all acknowledged outbox entries. Returns how many were
    /// removed.
    pub fn purge_acknowledged(&self) -> StoreResult<usize> {
        let mut state = self.state.write();

        let purged = state
            .outbox
            .values()
            .filter(|entry| entry.acknowledged)
            .count();
        if purged == 0 {
            return Ok(0);
        }

        self.append(&StoreRecord::OutboxPurge)?;
        state.apply(StoreRecord::OutboxPurge);
        Ok(purged)
    }

    // ---- settings and cursor ----

    /// Reads a device setting.
    #[must_use]
    pub fn setting(&self, key: &str) -> Option<String> {
        self.state.read().settings.get(key).cloned()
    }

    /// Writes a device setting.
    pub fn put_setting(&self, key: &str, value: &str) -> StoreResult<()> {
        let record = StoreRecord::SettingSet {
            key: key.to_string(),
            value: value.to_string(),
        };
        let mut state = self.state.write();
        self.append(&record)?;
        state.apply(record);
        Ok(())
    }

    /// Reads the mirrored sync cursor.
    #[must_use]
    pub fn cursor(&self) -> Option<SyncCursor> {
        self.state.read().cursor.clone()
    }

    /// Replaces the mirrored sync cursor.
    pub fn set_cursor(&self, cursor: SyncCursor) -> StoreResult<()> {
        let record = StoreRecord::CursorSet { cursor };
        let mut state = self.state.write();
        self.append(&record)?;
        state.apply(record);
        Ok(())
    }

    // ---- maintenance ----

    /// Rewrites the journal to hold only the current state.
    ///
    /// Dead frames (overwritten records, purged outbox entries, stale
    /// cursor and setting values) are dropped. The store is fully
    /// usable afterwards.
    pub fn compact(&self) -> StoreResult<()> {
        let state = self.state.write();

        let mut frames = Vec::new();
        let mut push = |record: &StoreRecord| -> StoreResult<()> {
            frames.push((record.kind().as_byte(), record.encode_payload()?));
            Ok(())
        };

        for (table, records) in &state.tables {
            for (record_id, payload) in records {
                push(&StoreRecord::EntityPut {
                    table: *table,
                    record_id: record_id.clone(),
                    payload: payload.clone(),
                })?;
            }
        }
        for entry in state.outbox.values() {
            push(&StoreRecord::OutboxAdd {
                entry: entry.clone(),
            })?;
        }
        for (key, value) in &state.settings {
            push(&StoreRecord::SettingSet {
                key: key.clone(),
                value: value.clone(),
            })?;
        }
        if let Some(cursor) = &state.cursor {
            push(&StoreRecord::CursorSet {
                cursor: cursor.clone(),
            })?;
        }

        self.journal.rewrite(&frames)?;
        Ok(())
    }

    /// Flushes and syncs the journal.
    pub fn flush(&self) -> StoreResult<()> {
        self.journal.flush()?;
        self.journal.sync()?;
        Ok(())
    }

    /// Returns the journal size in bytes.
    pub fn journal_size(&self) -> StoreResult<u64> {
        Ok(self.journal.size()?)
    }

    /// Journals one record. Callers hold the state write lock, so
    /// journal order matches apply order.
    fn append(&self, record: &StoreRecord) -> StoreResult<()> {
        let payload = record.encode_payload()?;
        self.journal.append(record.kind().as_byte(), &payload)?;
        Ok(())
    }
}

impl StoreState {
    /// Applies one journal record to in-memory state.
    ///
    /// Used both by replay and by the live write path, so a reopened
    /// store always matches the state before the close.
    fn apply(&mut self, record: StoreRecord) {
        match record {
            StoreRecord::EntityPut {
                table,
                record_id,
                payload,
            } => {
                let old = self.tables.entry(table).or_default().remove(&record_id);
                self.indexes
                    .entry(table)
                    .or_insert_with(|| TableIndexes::for_table(table))
                    .update(&record_id, old.as_ref(), Some(&payload));
                self.tables.entry(table).or_default().insert(record_id, payload);
            }

            StoreRecord::EntityDelete { table, record_id } => {
                let old = self
                    .tables
                    .get_mut(&table)
                    .and_then(|records| records.remove(&record_id));
                if old.is_some() {
                    self.indexes
                        .entry(table)
                        .or_insert_with(|| TableIndexes::for_table(table))
                        .update(&record_id, old.as_ref(), None);
                }
            }

            StoreRecord::OutboxAdd { entry } => {
                self.next_local_id = self.next_local_id.max(entry.local_id + 1);
                self.outbox.insert(entry.local_id, entry);
            }

            StoreRecord::OutboxAck { local_id } => {
                if let Some(entry) = self.outbox.get_mut(&local_id) {
                    entry.acknowledged = true;
                }
            }

            StoreRecord::OutboxPurge => {
                self.outbox.retain(|_, entry| !entry.acknowledged);
            }

            StoreRecord::CursorSet { cursor } => {
                self.cursor = Some(cursor);
            }

            StoreRecord::SettingSet { key, value } => {
                self.settings.insert(key, value);
            }

            StoreRecord::TablesClear => {
                self.tables.clear();
                for indexes in self.indexes.values_mut() {
                    indexes.clear();
                }
            }
        }
    }
}

/// Rejects writes addressed to a table this build does not know.
fn require_known(table: Table) -> StoreResult<()> {
    if table.is_known() {
        Ok(())
    } else {
        Err(StoreError::invalid_record("unknown table"))
    }
}

/// Extracts the record id from a payload's `"id"` field.
fn payload_id(payload: &Value) -> StoreResult<String> {
    payload
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(String::from)
        .ok_or_else(|| StoreError::invalid_record("payload has no string \"id\" field"))
}
