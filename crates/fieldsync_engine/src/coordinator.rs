//! The sync coordinator.
//!
//! A cycle runs push before pull so a device's own writes are judged for
//! conflicts before the server's newer state overwrites the local copy.
//! Entries the server rejects as conflicts are dropped from the outbox; the
//! winning records arrive moments later in the pull phase. Everything else
//! the cycle does is idempotent, so a crash between phases costs at most a
//! repeated request.

use crate::config::SyncConfig;
use crate::device;
use crate::error::{EngineError, EngineResult};
use crate::state::{SyncOutcome, SyncReport, SyncState, SyncStatus};
use crate::status::StatusFeed;
use crate::transport::SyncTransport;
use fieldsync_protocol::{
    now_millis, ConflictReport, ConflictRequest, CursorRepairRequest, ProposedChange, PullRequest,
    PushReceipt, PushRequest, SyncCursor,
};
use fieldsync_store::LocalStore;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Drives sync cycles against a server on behalf of one device.
///
/// The coordinator owns the transport and shares the [`LocalStore`] with
/// the application. All methods take `&self`; an atomic guard collapses
/// overlapping cycle requests into [`SyncOutcome::AlreadyRunning`].
pub struct SyncCoordinator<T: SyncTransport> {
    config: SyncConfig,
    store: Arc<LocalStore>,
    transport: T,
    device_id: String,
    online: AtomicBool,
    in_flight: AtomicBool,
    status: StatusFeed,
}

impl<T: SyncTransport> SyncCoordinator<T> {
    /// Creates a coordinator, minting a device id on first use.
    pub fn new(config: SyncConfig, store: Arc<LocalStore>, transport: T) -> EngineResult<Self> {
        let device_id = device::load_or_create_device_id(&store)?;
        let status = StatusFeed::new(SyncStatus::initial(true, store.pending_count()));
        Ok(Self {
            config,
            store,
            transport,
            device_id,
            online: AtomicBool::new(true),
            in_flight: AtomicBool::new(false),
            status,
        })
    }

    /// The device id this coordinator syncs as.
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// The store this coordinator syncs.
    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    /// The active configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Whether the coordinator believes it has connectivity.
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Whether a cycle is currently running.
    pub fn is_syncing(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// The latest status snapshot.
    pub fn status(&self) -> SyncStatus {
        self.status.current()
    }

    /// Subscribes to status snapshots; the current one is delivered first.
    pub fn subscribe(&self) -> Receiver<SyncStatus> {
        self.status.subscribe()
    }

    /// Records a connectivity change.
    ///
    /// Going from offline to online triggers an immediate cycle and returns
    /// its outcome. Any other transition returns `None`.
    pub fn set_online(&self, online: bool) -> EngineResult<Option<SyncOutcome>> {
        let was = self.online.swap(online, Ordering::SeqCst);
        if was == online {
            return Ok(None);
        }

        info!(online, "connectivity changed");
        self.publish(|status| status.online = online);

        if online {
            return Ok(Some(self.sync_now()?));
        }
        Ok(None)
    }

    /// Runs one sync cycle: push the outbox, then pull new changes.
    ///
    /// Returns without doing anything when a cycle is already running or
    /// the coordinator is offline.
    pub fn sync_now(&self) -> EngineResult<SyncOutcome> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("sync already in progress");
            return Ok(SyncOutcome::AlreadyRunning);
        }

        let result = self.run_cycle();
        self.in_flight.store(false, Ordering::SeqCst);

        match &result {
            Ok(SyncOutcome::Completed(report)) => {
                info!(
                    pushed = report.pushed,
                    conflicts = report.conflicts,
                    rejected = report.rejected,
                    pulled = report.pulled,
                    skipped = report.skipped,
                    resynced = report.resynced,
                    "sync cycle completed"
                );
                self.publish(|status| {
                    status.state = SyncState::Idle;
                    status.last_sync_at = Some(now_millis());
                    status.last_error = None;
                });
            }
            Ok(_) => {}
            Err(error) => {
                warn!(%error, "sync cycle failed");
                self.publish(|status| {
                    status.state = SyncState::Idle;
                    status.last_error = Some(error.to_string());
                });
            }
        }

        result
    }

    /// Runs [`sync_now`](Self::sync_now), retrying retryable failures with
    /// exponential backoff.
    pub fn sync_with_retry(&self) -> EngineResult<SyncOutcome> {
        let retry = &self.config.retry;
        let mut last_error = None;

        for attempt in 0..retry.max_attempts {
            if attempt > 0 {
                std::thread::sleep(retry.delay_for_attempt(attempt));
            }

            match self.sync_now() {
                Ok(outcome) => return Ok(outcome),
                Err(error) if error.is_retryable() && attempt + 1 < retry.max_attempts => {
                    warn!(attempt, %error, "sync attempt failed; will retry");
                    last_error = Some(error);
                }
                Err(error) => return Err(error),
            }
        }

        Err(last_error
            .unwrap_or_else(|| EngineError::transport_fatal("no sync attempts were made")))
    }

    /// Asks the server which pending outbox entries would conflict,
    /// without pushing anything.
    pub fn preview_conflicts(&self) -> EngineResult<Vec<ConflictReport>> {
        let pending = self.store.pending();
        let proposals: Vec<ProposedChange> = pending.iter().map(ProposedChange::from).collect();
        let request = ConflictRequest::new(self.device_id.clone(), proposals);
        self.transport.conflicts(&request)
    }

    /// Jumps this device's server-side cursor to the head of the change
    /// log and mirrors it locally.
    ///
    /// Changes between the old and new positions are never delivered; this
    /// is an operator escape hatch for a cursor that has fallen
    /// pathologically behind.
    pub fn repair_cursor(&self) -> EngineResult<SyncCursor> {
        let request = CursorRepairRequest {
            device_id: self.device_id.clone(),
        };
        let repaired = self.transport.repair_cursor(&request)?;
        info!(version = repaired.version, "cursor repaired to server head");
        self.store.set_cursor(repaired.clone())?;
        Ok(repaired)
    }

    fn run_cycle(&self) -> EngineResult<SyncOutcome> {
        if !self.is_online() {
            debug!("offline; skipping sync cycle");
            return Ok(SyncOutcome::Offline);
        }

        let started = Instant::now();
        let mut report = SyncReport::default();

        self.set_phase(SyncState::Pushing);
        self.push_outbox(&mut report)?;

        self.set_phase(SyncState::Pulling);
        self.pull_changes(&mut report)?;

        report.duration = started.elapsed();
        Ok(SyncOutcome::Completed(report))
    }

    fn push_outbox(&self, report: &mut SyncReport) -> EngineResult<()> {
        let pending = self.store.pending();
        if pending.is_empty() {
            return Ok(());
        }

        debug!(entries = pending.len(), "pushing outbox");
        for chunk in pending.chunks(self.config.push_batch_size.max(1)) {
            let request = PushRequest::new(self.device_id.clone(), chunk.to_vec());
            let receipts = self.transport.push(&request)?;
            self.settle_receipts(&receipts, report)?;
        }
        self.store.purge_acknowledged()?;
        Ok(())
    }

    fn settle_receipts(
        &self,
        receipts: &[PushReceipt],
        report: &mut SyncReport,
    ) -> EngineResult<()> {
        for receipt in receipts {
            if receipt.success {
                self.store.acknowledge(receipt.id)?;
                report.pushed += 1;
            } else if receipt.is_conflict() {
                // The server kept newer state for this record. Drop the
                // entry; the winning copy arrives on the next pull.
                warn!(
                    local_id = receipt.id,
                    error = receipt.error.as_deref().unwrap_or(""),
                    "dropping conflicting outbox entry"
                );
                self.store.acknowledge(receipt.id)?;
                report.conflicts += 1;
            } else {
                // Refused entries stay queued so nothing is silently lost.
                warn!(
                    local_id = receipt.id,
                    error = receipt.error.as_deref().unwrap_or(""),
                    "server refused outbox entry"
                );
                report.rejected += 1;
            }
        }
        Ok(())
    }

    fn pull_changes(&self, report: &mut SyncReport) -> EngineResult<()> {
        let mut resyncing = false;
        loop {
            let since = self.cursor_version();
            let request = PullRequest::new(self.device_id.clone(), since);
            let response = self.transport.pull(&request)?;

            if response.resync && !resyncing {
                // The server swept history past our cursor. Restart as a
                // fresh device: clear synced tables, rewind the cursor, and
                // take the snapshot from the top. The outbox is untouched.
                warn!(cursor = since, "server history no longer reaches our cursor; resyncing");
                self.store.clear_tables()?;
                self.store
                    .set_cursor(SyncCursor::new(self.device_id.clone()))?;
                resyncing = true;
                report.resynced = true;
                continue;
            }

            let mut changes = response.changes.clone();
            changes.sort_by_key(|change| change.version);

            for change in &changes {
                if change.version <= since {
                    continue;
                }
                if self.store.apply_change(change)? {
                    report.pulled += 1;
                } else {
                    debug!(
                        table = %change.table,
                        version = change.version,
                        "skipping change with unknown table or operation"
                    );
                    report.skipped += 1;
                }
            }

            self.advance_cursor(response.cursor_version()?)?;

            if !response.has_more {
                return Ok(());
            }
        }
    }

    fn cursor_version(&self) -> u64 {
        self.store.cursor().map_or(0, |cursor| cursor.version)
    }

    fn advance_cursor(&self, version: u64) -> EngineResult<()> {
        let mut cursor = self
            .store
            .cursor()
            .unwrap_or_else(|| SyncCursor::new(self.device_id.clone()));
        cursor.advance_to(version, now_millis());
        self.store.set_cursor(cursor)?;
        Ok(())
    }

    fn set_phase(&self, state: SyncState) {
        self.publish(|status| status.state = state);
    }

    fn publish<F: FnOnce(&mut SyncStatus)>(&self, update: F) {
        let mut status = self.status.current();
        update(&mut status);
        status.pending = self.store.pending_count();
        self.status.publish(status);
    }
}
