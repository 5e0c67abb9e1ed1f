//! The sync service.

use crate::change_log::ChangeLog;
use crate::config::ServerConfig;
use crate::cursors::CursorManager;
use crate::error::{ServerError, ServerResult};
use crate::journal::{LogRecord, ServerDir};
use fieldsync_protocol::{
    endpoints, now_millis, wire, ChangeRecord, ConflictReport, ConflictRequest,
    CursorRepairRequest, Operation, OutboxEntry, PullRequest, PullResponse, PushReceipt,
    PushRequest, SyncCursor, CONFLICT_ERROR_PREFIX,
};
use fieldsync_storage::{FileBackend, InMemoryBackend, Journal, StorageBackend};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

/// The server half of the sync protocol.
///
/// `SyncService` owns the change log, the per-device cursors, and the
/// journal both are rebuilt from on open. One instance serves every
/// device of a tenant.
///
/// All writes happen under a single write lock, which is what makes
/// change versions dense, monotonic, and totally ordered. Version
/// assignment is split in two steps: the version is taken with
/// [`ChangeLog::next_version`], the change is journaled, and only then
/// is the log counter committed, so a failed journal write never burns
/// a version.
///
/// # Opening a Service
///
/// ```rust,ignore
/// use fieldsync_server::SyncService;
/// use std::path::Path;
///
/// let service = SyncService::open(Path::new("sync_server"))?;
/// ```
///
/// For tests, `SyncService::open_in_memory()` creates a non-persistent
/// service.
pub struct SyncService {
    /// Service configuration.
    config: ServerConfig,
    /// Server directory (holds the lock). None for in-memory services.
    dir: Option<ServerDir>,
    /// Change and cursor journal.
    journal: Journal,
    /// In-memory state, rebuilt from the journal on open.
    state: RwLock<ServiceState>,
}

/// Mutable service state.
#[derive(Default)]
struct ServiceState {
    /// The change log.
    log: ChangeLog,
    /// Per-device cursors.
    cursors: CursorManager,
    /// Successful push receipts by `(device_id, local_id)`, replayed on
    /// retried pushes so a lost response is not applied twice. Held in
    /// memory only; a retry arriving after a restart is re-judged
    /// against the log.
    push_ledger: HashMap<(String, u64), PushReceipt>,
}

impl SyncService {
    /// Opens a service from a directory path with default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if another process holds the server lock
    /// (`ServerLocked`), the journal is corrupted, or I/O fails.
    pub fn open(path: &Path) -> ServerResult<Self> {
        Self::open_with_config(path, ServerConfig::default())
    }

    /// Opens a service from a directory path with custom configuration.
    pub fn open_with_config(path: &Path, config: ServerConfig) -> ServerResult<Self> {
        let dir = ServerDir::open(path, config.create_if_missing)?;
        let backend = FileBackend::open_with_create_dirs(&dir.journal_path())?;
        Self::replay(Some(dir), Box::new(backend), config)
    }

    /// Opens a service over a pre-configured backend.
    pub fn open_with_backend(
        backend: Box<dyn StorageBackend>,
        config: ServerConfig,
    ) -> ServerResult<Self> {
        Self::replay(None, backend, config)
    }

    /// Opens a fresh in-memory service for testing.
    ///
    /// Data is lost when the service is dropped.
    pub fn open_in_memory() -> ServerResult<Self> {
        Self::open_with_backend(Box::new(InMemoryBackend::new()), ServerConfig::default())
    }

    /// Rebuilds state from the journal.
    fn replay(
        dir: Option<ServerDir>,
        backend: Box<dyn StorageBackend>,
        config: ServerConfig,
    ) -> ServerResult<Self> {
        let journal = Journal::new(backend, config.sync_on_write);

        let recovery = journal.recover()?;
        if recovery.torn_tail {
            warn!(
                valid_len = recovery.valid_len,
                "discarding torn journal tail"
            );
            journal.truncate_to(recovery.valid_len)?;
        }

        let mut state = ServiceState::default();
        for frame in &recovery.frames {
            match LogRecord::decode_payload(frame.kind, &frame.payload)? {
                LogRecord::Change { record } => state.log.record(record),
                LogRecord::CursorSet { cursor } => state.cursors.restore(cursor),
                LogRecord::PurgedThrough { version } => state.log.set_purged_through(version),
                LogRecord::Latest { record } => state.log.seed_latest(record),
            }
        }

        Ok(Self {
            config,
            dir,
            journal,
            state: RwLock::new(state),
        })
    }

    /// Returns the server directory path, if persistent.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.dir.as_ref().map(ServerDir::path)
    }

    // ---- endpoints ----

    /// Serves a pull (`GET /sync/changes`).
    ///
    /// The claimed `lastVersion` both selects where the page starts and
    /// advances the device's stored cursor; pulls are the only place
    /// cursors move during normal operation. An absent claim serves
    /// from the stored cursor.
    ///
    /// When the claim predates purged history, the page comes from the
    /// latest-state snapshot instead and is flagged `resync`.
    pub fn handle_pull(&self, request: &PullRequest) -> ServerResult<PullResponse> {
        require_device_id(&request.device_id)?;
        let now = now_millis();
        let mut state = self.state.write();

        let (cursor, created) = state.cursors.get_or_create(&request.device_id, now);
        if created {
            self.append(&LogRecord::CursorSet {
                cursor: cursor.clone(),
            })?;
        }

        let since = match request.last_version {
            Some(claimed) => {
                let (advanced, moved) = state.cursors.advance(&request.device_id, claimed, now);
                if moved {
                    self.append(&LogRecord::CursorSet { cursor: advanced })?;
                }
                // Serve from the claim even when it trails the stored
                // cursor; re-applying full payloads is harmless.
                claimed
            }
            None => cursor.version,
        };

        if state.log.needs_full_resync(since) {
            let (changes, has_more) = state.log.snapshot_since(since, self.config.max_pull_batch);
            let mut page_cursor = changes.last().map_or(since, |last| last.version);
            if !has_more {
                // The snapshot can end below the purge watermark when
                // the newest changes are tombstones. Jumping the final
                // page cursor to the watermark keeps the device's next
                // pull out of the resync branch.
                page_cursor = page_cursor.max(state.log.purged_through());
            }
            return Ok(PullResponse::new(changes, page_cursor, has_more, true));
        }

        let (changes, has_more) = state.log.changes_since(since, self.config.max_pull_batch);
        let page_cursor = changes.last().map_or(since, |last| last.version);
        Ok(PullResponse::new(changes, page_cursor, has_more, false))
    }

    /// Serves a push (`POST /sync/changes`).
    ///
    /// Entries are admitted one at a time in submission order, each
    /// producing a receipt. Conflicts are judged against the log as it
    /// stood when the batch arrived, so entries within one batch never
    /// conflict with each other. The device's cursor is never advanced
    /// here.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` when the batch exceeds the configured
    /// push limit. Per-entry validation and conflict failures are
    /// receipts, not errors.
    pub fn handle_push(&self, request: &PushRequest) -> ServerResult<Vec<PushReceipt>> {
        require_device_id(&request.device_id)?;
        if request.changes.len() > self.config.max_push_batch {
            return Err(ServerError::InvalidRequest(format!(
                "push of {} entries exceeds the limit of {}",
                request.changes.len(),
                self.config.max_push_batch
            )));
        }

        let now = now_millis();
        let mut state = self.state.write();

        let (cursor, created) = state.cursors.get_or_create(&request.device_id, now);
        if created {
            self.append(&LogRecord::CursorSet {
                cursor: cursor.clone(),
            })?;
        }
        let device_version = cursor.version;
        let batch_upper = state.log.latest_version();

        let mut receipts = Vec::with_capacity(request.changes.len());
        for entry in &request.changes {
            let ledger_key = (request.device_id.clone(), entry.local_id);
            if let Some(replayed) = state.push_ledger.get(&ledger_key) {
                receipts.push(replayed.clone());
                continue;
            }

            let receipt = self.admit(&mut state, entry, device_version, batch_upper, now)?;
            if receipt.success {
                state.push_ledger.insert(ledger_key, receipt.clone());
            }
            receipts.push(receipt);
        }

        Ok(receipts)
    }

    /// Validates and appends one pushed entry, producing its receipt.
    ///
    /// An `Err` means the append itself failed; everything the client
    /// can fix comes back as a rejection receipt.
    fn admit(
        &self,
        state: &mut ServiceState,
        entry: &OutboxEntry,
        device_version: u64,
        batch_upper: u64,
        now: u64,
    ) -> ServerResult<PushReceipt> {
        if !entry.table.is_known() {
            return Ok(PushReceipt::rejected(entry.local_id, "unknown table"));
        }
        if !entry.operation.is_known() {
            return Ok(PushReceipt::rejected(entry.local_id, "unknown operation"));
        }
        if entry.record_id.is_empty() {
            return Ok(PushReceipt::rejected(entry.local_id, "missing recordId"));
        }
        if entry.operation != Operation::Delete && entry.payload.is_none() {
            return Ok(PushReceipt::rejected(
                entry.local_id,
                format!(
                    "{} entry for {} has no payload",
                    entry.operation, entry.record_id
                ),
            ));
        }

        let key = (entry.table, entry.record_id.clone());
        let intervening = state.log.intervening(&key, device_version, batch_upper);
        if !intervening.is_empty() && !self.config.conflict_policy.accepts(entry, &intervening) {
            return Ok(PushReceipt::rejected(
                entry.local_id,
                format!(
                    "{CONFLICT_ERROR_PREFIX} {} newer server changes for {} {}",
                    intervening.len(),
                    entry.table,
                    entry.record_id
                ),
            ));
        }

        let payload = match entry.operation {
            Operation::Delete => None,
            _ => entry.payload.clone(),
        };
        let version = state.log.next_version();
        let record = ChangeRecord::new(
            entry.table,
            entry.record_id.clone(),
            entry.operation,
            payload,
            version,
            now,
        );

        self.append(&LogRecord::Change {
            record: record.clone(),
        })?;
        state.log.record(record);

        Ok(PushReceipt::accepted(entry.local_id))
    }

    /// Serves a conflict preview (`POST /sync/conflicts`).
    ///
    /// Read-only: reports which proposed changes would currently be
    /// treated as conflicting, judged against the device's stored
    /// cursor. A device that has never synced is judged from version 0.
    pub fn handle_conflicts(&self, request: &ConflictRequest) -> ServerResult<Vec<ConflictReport>> {
        require_device_id(&request.device_id)?;
        let state = self.state.read();

        let device_version = state
            .cursors
            .get(&request.device_id)
            .map_or(0, |cursor| cursor.version);
        let upper = state.log.latest_version();

        Ok(request
            .changes
            .iter()
            .filter_map(|change| {
                let key = (change.table, change.record_id.clone());
                let server_changes = state.log.intervening(&key, device_version, upper);
                (!server_changes.is_empty()).then(|| ConflictReport {
                    change: change.clone(),
                    server_changes,
                })
            })
            .collect())
    }

    /// Serves a cursor repair (`POST /sync/cursor`).
    ///
    /// Jumps the device's cursor to the log head, creating it first if
    /// the device is unknown. Returns the cursor after the repair.
    pub fn handle_cursor_repair(&self, request: &CursorRepairRequest) -> ServerResult<SyncCursor> {
        require_device_id(&request.device_id)?;
        let now = now_millis();
        let mut state = self.state.write();

        let (cursor, created) = state.cursors.get_or_create(&request.device_id, now);
        if created {
            self.append(&LogRecord::CursorSet {
                cursor: cursor.clone(),
            })?;
        }

        let latest = state.log.latest_version();
        let (repaired, moved) = state.cursors.repair(&request.device_id, latest, now);
        if moved {
            self.append(&LogRecord::CursorSet {
                cursor: repaired.clone(),
            })?;
        }

        Ok(repaired)
    }

    /// Routes a raw request to its handler and encodes the response.
    ///
    /// This is the seam an HTTP listener (or an in-process loopback
    /// client) plugs into: method, path with optional query string, and
    /// body bytes in; response body bytes out.
    pub fn handle(&self, method: &str, path_and_query: &str, body: &[u8]) -> ServerResult<Vec<u8>> {
        let (path, query) = match path_and_query.split_once('?') {
            Some((path, query)) => (path, query),
            None => (path_and_query, ""),
        };

        match (method, path) {
            ("GET", endpoints::CHANGES) => {
                let request = PullRequest::from_query(query)?;
                let response = self.handle_pull(&request)?;
                Ok(wire::encode(&response)?)
            }
            ("POST", endpoints::CHANGES) => {
                let request: PushRequest = wire::decode(body)?;
                let receipts = self.handle_push(&request)?;
                Ok(wire::encode(&receipts)?)
            }
            ("POST", endpoints::CONFLICTS) => {
                let request: ConflictRequest = wire::decode(body)?;
                let reports = self.handle_conflicts(&request)?;
                Ok(wire::encode(&reports)?)
            }
            ("POST", endpoints::CURSOR) => {
                let request: CursorRepairRequest = wire::decode(body)?;
                let cursor = self.handle_cursor_repair(&request)?;
                Ok(wire::encode(&cursor)?)
            }
            _ => Err(ServerError::unknown_route(method, path)),
        }
    }

    // ---- maintenance ----

    /// Purges change records older than the retention horizon.
    ///
    /// Returns the number purged. Devices whose cursor predates the
    /// purge fall back to a full resync on their next pull.
    pub fn sweep_retention(&self) -> ServerResult<usize> {
        self.sweep_retention_at(now_millis())
    }

    /// Runs the retention sweep against an explicit clock.
    pub fn sweep_retention_at(&self, now: u64) -> ServerResult<usize> {
        let cutoff = now.saturating_sub(self.config.retention_millis());
        let mut state = self.state.write();

        let removed = state.log.sweep_before(cutoff);
        if removed == 0 {
            return Ok(0);
        }

        // Receipts for purged history are gone with it; a device
        // resubmitting entries this old is re-judged against the
        // latest-state map.
        state.push_ledger.clear();

        self.rewrite_journal(&state)?;
        info!(
            removed,
            purged_through = state.log.purged_through(),
            "retention sweep purged change history"
        );
        Ok(removed)
    }

    /// Rewrites the journal to hold only the current state.
    fn rewrite_journal(&self, state: &ServiceState) -> ServerResult<()> {
        let mut frames = Vec::new();
        let mut push = |record: &LogRecord| -> ServerResult<()> {
            frames.push((record.kind().as_byte(), record.encode_payload()?));
            Ok(())
        };

        let purged_through = state.log.purged_through();
        push(&LogRecord::PurgedThrough {
            version: purged_through,
        })?;
        // Latest entries above the watermark are rebuilt from the
        // retained changes on replay, so only the purged ones are
        // written out.
        for record in state.log.latest_entries() {
            if record.version <= purged_through {
                push(&LogRecord::Latest { record })?;
            }
        }
        for record in state.log.retained() {
            push(&LogRecord::Change {
                record: record.clone(),
            })?;
        }
        for cursor in state.cursors.iter() {
            push(&LogRecord::CursorSet {
                cursor: cursor.clone(),
            })?;
        }

        self.journal.rewrite(&frames)?;
        Ok(())
    }

    /// Flushes and syncs the journal.
    pub fn flush(&self) -> ServerResult<()> {
        self.journal.flush()?;
        self.journal.sync()?;
        Ok(())
    }

    /// Returns the journal size in bytes.
    pub fn journal_size(&self) -> ServerResult<u64> {
        Ok(self.journal.size()?)
    }

    // ---- introspection ----

    /// Returns the newest change-log version, 0 when nothing was ever
    /// appended.
    #[must_use]
    pub fn latest_version(&self) -> u64 {
        self.state.read().log.latest_version()
    }

    /// Returns the retention purge watermark.
    #[must_use]
    pub fn purged_through(&self) -> u64 {
        self.state.read().log.purged_through()
    }

    /// Returns the number of retained change records.
    #[must_use]
    pub fn change_count(&self) -> usize {
        self.state.read().log.len()
    }

    /// Reads retained change records after `since` without touching any
    /// cursor, up to `limit` per call.
    #[must_use]
    pub fn changes_since(&self, since: u64, limit: usize) -> (Vec<ChangeRecord>, bool) {
        self.state.read().log.changes_since(since, limit)
    }

    /// Returns a device's cursor, if it has contacted the service.
    #[must_use]
    pub fn cursor(&self, device_id: &str) -> Option<SyncCursor> {
        self.state.read().cursors.get(device_id).cloned()
    }

    /// Returns every device cursor, in arbitrary order.
    #[must_use]
    pub fn cursors(&self) -> Vec<SyncCursor> {
        self.state.read().cursors.iter().cloned().collect()
    }

    /// Journals one record. Callers hold the state write lock, so
    /// journal order matches apply order.
    fn append(&self, record: &LogRecord) -> ServerResult<()> {
        let payload = record.encode_payload()?;
        self.journal.append(record.kind().as_byte(), &payload)?;
        Ok(())
    }
}

/// Rejects requests that carry no device id.
fn require_device_id(device_id: &str) -> ServerResult<()> {
    if device_id.is_empty() {
        return Err(ServerError::InvalidRequest("missing deviceId".into()));
    }
    Ok(())
}
