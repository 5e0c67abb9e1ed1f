//! Integration tests running the coordinator against a real sync service
//! through the loopback HTTP client.

use fieldsync_engine::{
    HttpTransport, LoopbackClient, LoopbackServer, SyncConfig, SyncCoordinator, SyncOutcome,
    SyncReport,
};
use fieldsync_protocol::{now_millis, Table};
use fieldsync_server::{ServerConfig, SyncService};
use fieldsync_store::LocalStore;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

/// Routes engine requests straight into an in-process service.
struct Loopback {
    service: Arc<SyncService>,
}

impl LoopbackServer for Loopback {
    fn handle_request(
        &self,
        method: &str,
        path_and_query: &str,
        body: &[u8],
    ) -> Result<Vec<u8>, String> {
        self.service
            .handle(method, path_and_query, body)
            .map_err(|e| e.to_string())
    }
}

type Device = SyncCoordinator<HttpTransport<LoopbackClient<Loopback>>>;

fn device(service: &Arc<SyncService>) -> Device {
    let store = Arc::new(LocalStore::open_in_memory().unwrap());
    let client = LoopbackClient::new(Loopback {
        service: Arc::clone(service),
    });
    let transport = HttpTransport::new("http://sync.local", client);
    SyncCoordinator::new(SyncConfig::new("http://sync.local"), store, transport).unwrap()
}

fn cycle(device: &Device) -> SyncReport {
    match device.sync_now().unwrap() {
        SyncOutcome::Completed(report) => report,
        other => panic!("expected a completed cycle, got {other:?}"),
    }
}

fn work_order(id: &str, status: &str) -> serde_json::Value {
    json!({"id": id, "status": status, "title": "pump inspection"})
}

#[test]
fn two_devices_converge() {
    let service = Arc::new(SyncService::open_in_memory().unwrap());
    let a = device(&service);
    let b = device(&service);

    a.store()
        .put(Table::WorkOrders, work_order("wo-1", "open"))
        .unwrap();
    let report = cycle(&a);
    assert_eq!(report.pushed, 1);

    let report = cycle(&b);
    assert_eq!(report.pulled, 1);
    let seen = b.store().get(Table::WorkOrders, "wo-1").unwrap();
    assert_eq!(seen["status"], "open");

    b.store()
        .put(Table::WorkOrders, work_order("wo-1", "done"))
        .unwrap();
    cycle(&b);
    cycle(&a);

    let seen = a.store().get(Table::WorkOrders, "wo-1").unwrap();
    assert_eq!(seen["status"], "done");
    assert_eq!(
        a.store().get_all(Table::WorkOrders),
        b.store().get_all(Table::WorkOrders)
    );
}

#[test]
fn first_cycle_echoes_own_changes_back() {
    let service = Arc::new(SyncService::open_in_memory().unwrap());
    let a = device(&service);

    a.store()
        .put(Table::WorkOrders, work_order("wo-1", "open"))
        .unwrap();

    // The cursor moves in the pull phase only, so the cycle that pushed
    // the change also pulls it back once.
    let report = cycle(&a);
    assert_eq!(report.pushed, 1);
    assert_eq!(report.pulled, 1);
    assert_eq!(a.store().cursor().unwrap().version, 1);

    let report = cycle(&a);
    assert_eq!(report.pulled, 0);
}

#[test]
fn conflicting_edit_loses_to_the_server() {
    let service = Arc::new(SyncService::open_in_memory().unwrap());
    let a = device(&service);
    let b = device(&service);

    a.store()
        .put(Table::WorkOrders, work_order("wo-1", "new"))
        .unwrap();
    cycle(&a);
    cycle(&b);

    // Both edit the same record; A reaches the server first.
    a.store()
        .put(Table::WorkOrders, work_order("wo-1", "from-a"))
        .unwrap();
    cycle(&a);
    b.store()
        .put(Table::WorkOrders, work_order("wo-1", "from-b"))
        .unwrap();

    let report = cycle(&b);
    assert_eq!(report.conflicts, 1);
    assert_eq!(report.pushed, 0);

    // B's edit is gone and A's won everywhere.
    assert!(b.store().pending().is_empty());
    let seen = b.store().get(Table::WorkOrders, "wo-1").unwrap();
    assert_eq!(seen["status"], "from-a");
    assert_eq!(service.change_count(), 2);
}

#[test]
fn deletes_propagate() {
    let service = Arc::new(SyncService::open_in_memory().unwrap());
    let a = device(&service);
    let b = device(&service);

    a.store()
        .put(Table::Customers, json!({"id": "c-1", "name": "Acme", "document": "123"}))
        .unwrap();
    cycle(&a);
    cycle(&b);
    assert!(b.store().get(Table::Customers, "c-1").is_some());

    a.store().delete(Table::Customers, "c-1").unwrap();
    cycle(&a);
    cycle(&b);
    assert!(b.store().get(Table::Customers, "c-1").is_none());
}

#[test]
fn paged_pull_crosses_batches() {
    let dir = tempfile::tempdir().unwrap();
    let config = ServerConfig::default().with_max_pull_batch(2);
    let service = Arc::new(SyncService::open_with_config(dir.path(), config).unwrap());

    let a = device(&service);
    for i in 0..5 {
        a.store()
            .put(Table::WorkOrders, work_order(&format!("wo-{i}"), "open"))
            .unwrap();
    }
    let report = cycle(&a);
    assert_eq!(report.pushed, 5);
    assert_eq!(report.pulled, 5);

    let b = device(&service);
    let report = cycle(&b);
    assert_eq!(report.pulled, 5);
    assert_eq!(b.store().cursor().unwrap().version, 5);
    assert_eq!(b.store().get_all(Table::WorkOrders).len(), 5);
}

#[test]
fn push_splits_into_batches() {
    let service = Arc::new(SyncService::open_in_memory().unwrap());
    let store = Arc::new(LocalStore::open_in_memory().unwrap());
    let client = LoopbackClient::new(Loopback {
        service: Arc::clone(&service),
    });
    let transport = HttpTransport::new("http://sync.local", client);
    let config = SyncConfig::new("http://sync.local").with_push_batch_size(2);
    let a = SyncCoordinator::new(config, store, transport).unwrap();

    for i in 0..5 {
        a.store()
            .put(Table::WorkOrders, work_order(&format!("wo-{i}"), "open"))
            .unwrap();
    }

    let report = cycle(&a);
    assert_eq!(report.pushed, 5);
    assert!(a.store().pending().is_empty());
    assert_eq!(service.change_count(), 5);
}

#[test]
fn full_resync_after_retention_sweep() {
    let service = Arc::new(SyncService::open_in_memory().unwrap());
    let a = device(&service);
    let b = device(&service);

    a.store()
        .put(Table::WorkOrders, work_order("wo-1", "open"))
        .unwrap();
    cycle(&a);
    cycle(&b);

    a.store()
        .put(Table::WorkOrders, work_order("wo-2", "open"))
        .unwrap();
    a.store()
        .put(Table::WorkOrders, work_order("wo-3", "open"))
        .unwrap();
    cycle(&a);

    // Thirty-one days later every change has aged out.
    let removed = service
        .sweep_retention_at(now_millis() + 31 * 24 * 3_600_000)
        .unwrap();
    assert_eq!(removed, 3);

    // B still writes while behind the purge watermark.
    b.store()
        .put(Table::Products, json!({"id": "p-1", "sku": "PMP-7", "name": "Pump"}))
        .unwrap();

    let report = cycle(&b);
    assert!(report.resynced);
    assert_eq!(report.pushed, 1);

    // The snapshot rebuilt everything, including B's own write.
    assert_eq!(b.store().get_all(Table::WorkOrders).len(), 3);
    assert!(b.store().get(Table::Products, "p-1").is_some());
    assert!(b.store().pending().is_empty());
    assert_eq!(b.store().cursor().unwrap().version, 4);

    // A was at the watermark, so it needs no resync to pick up B's write.
    let report = cycle(&a);
    assert!(!report.resynced);
    assert_eq!(report.pulled, 1);
    assert!(a.store().get(Table::Products, "p-1").is_some());
}

#[test]
fn preview_reports_conflicts_without_pushing() {
    let service = Arc::new(SyncService::open_in_memory().unwrap());
    let a = device(&service);
    let b = device(&service);

    a.store()
        .put(Table::WorkOrders, work_order("wo-1", "new"))
        .unwrap();
    cycle(&a);
    cycle(&b);

    a.store()
        .put(Table::WorkOrders, work_order("wo-1", "from-a"))
        .unwrap();
    cycle(&a);
    b.store()
        .put(Table::WorkOrders, work_order("wo-1", "from-b"))
        .unwrap();

    let reports = b.preview_conflicts().unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].change.record_id, "wo-1");
    assert_eq!(reports[0].server_changes.len(), 1);

    // Nothing moved: the entry is still queued and the server unchanged.
    assert_eq!(b.store().pending().len(), 1);
    assert_eq!(service.change_count(), 2);
}

#[test]
fn cursor_repair_skips_history() {
    let service = Arc::new(SyncService::open_in_memory().unwrap());
    let a = device(&service);
    let b = device(&service);

    for i in 0..3 {
        a.store()
            .put(Table::WorkOrders, work_order(&format!("wo-{i}"), "open"))
            .unwrap();
    }
    cycle(&a);

    let repaired = b.repair_cursor().unwrap();
    assert_eq!(repaired.version, 3);
    assert_eq!(service.cursor(b.device_id()).unwrap().version, 3);

    // The skipped history is never delivered.
    let report = cycle(&b);
    assert_eq!(report.pulled, 0);
    assert!(b.store().get_all(Table::WorkOrders).is_empty());
}

#[test]
fn offline_device_catches_up_on_reconnect() {
    let service = Arc::new(SyncService::open_in_memory().unwrap());
    let a = device(&service);
    let b = device(&service);

    b.set_online(false).unwrap();
    b.store()
        .put(Table::WorkOrders, work_order("wo-b", "queued-offline"))
        .unwrap();
    assert_eq!(b.sync_now().unwrap(), SyncOutcome::Offline);

    a.store()
        .put(Table::WorkOrders, work_order("wo-a", "open"))
        .unwrap();
    cycle(&a);

    let outcome = b.set_online(true).unwrap().expect("reconnect syncs");
    let report = match outcome {
        SyncOutcome::Completed(report) => report,
        other => panic!("expected a completed cycle, got {other:?}"),
    };
    assert_eq!(report.pushed, 1);
    assert_eq!(report.pulled, 2);
    assert!(b.store().get(Table::WorkOrders, "wo-a").is_some());
    assert!(b.store().get(Table::WorkOrders, "wo-b").is_some());
}

#[test]
fn scheduler_drives_cycles_end_to_end() {
    let service = Arc::new(SyncService::open_in_memory().unwrap());
    let a = device(&service);
    a.store()
        .put(Table::WorkOrders, work_order("wo-1", "open"))
        .unwrap();

    let coordinator = Arc::new(a);
    let scheduler = fieldsync_engine::SyncScheduler::start(Arc::clone(&coordinator));
    scheduler.trigger_now();

    let deadline = std::time::Instant::now() + Duration::from_secs(2);
    while coordinator.status().last_sync_at.is_none() && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    scheduler.stop();

    assert!(coordinator.store().pending().is_empty());
    assert_eq!(service.change_count(), 1);
}
