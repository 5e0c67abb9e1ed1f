//! Cross-crate integration test helpers.
//!
//! Provides a harness that wires engine coordinators to an in-process
//! sync service through the loopback HTTP client, so multi-device
//! scenarios run without a network.

use fieldsync_engine::{
    HttpTransport, LoopbackClient, LoopbackServer, SyncConfig, SyncCoordinator, SyncOutcome,
    SyncReport,
};
use fieldsync_protocol::Table;
use fieldsync_server::{ServerConfig, SyncService};
use fieldsync_storage::InMemoryBackend;
use fieldsync_store::LocalStore;
use std::sync::Arc;

/// Base URL handed to harness transports. Loopback routing only looks
/// at the path, so the origin is never resolved.
const BASE_URL: &str = "http://fieldsync.test";

/// Routes engine requests straight into an in-process sync service.
pub struct ServiceLoopback {
    service: Arc<SyncService>,
}

impl ServiceLoopback {
    /// Creates a loopback around a shared service.
    pub fn new(service: Arc<SyncService>) -> Self {
        Self { service }
    }
}

impl LoopbackServer for ServiceLoopback {
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

/// Transport used by harness devices.
pub type LoopbackTransport = HttpTransport<LoopbackClient<ServiceLoopback>>;

/// Coordinator type produced by the harness.
pub type TestDevice = SyncCoordinator<LoopbackTransport>;

/// A shared in-process service plus a device factory.
pub struct SyncHarness {
    service: Arc<SyncService>,
}

impl SyncHarness {
    /// Creates a harness with default server configuration.
    pub fn new() -> Self {
        Self::with_config(ServerConfig::default())
    }

    /// Creates a harness with a custom server configuration.
    pub fn with_config(config: ServerConfig) -> Self {
        let service = SyncService::open_with_backend(Box::new(InMemoryBackend::new()), config)
            .expect("Failed to open sync service");
        Self {
            service: Arc::new(service),
        }
    }

    /// Returns the shared service for direct inspection.
    pub fn service(&self) -> &SyncService {
        &self.service
    }

    /// Creates a device backed by a fresh in-memory store.
    pub fn device(&self) -> TestDevice {
        let store = LocalStore::open_in_memory().expect("Failed to open store");
        self.device_with_store(Arc::new(store))
    }

    /// Creates a device backed by the given store. Used for restart
    /// scenarios where a store outlives its coordinator.
    pub fn device_with_store(&self, store: Arc<LocalStore>) -> TestDevice {
        let client = LoopbackClient::new(ServiceLoopback::new(Arc::clone(&self.service)));
        let transport = HttpTransport::new(BASE_URL, client);
        SyncCoordinator::new(SyncConfig::new(BASE_URL), store, transport)
            .expect("Failed to build coordinator")
    }
}

impl Default for SyncHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs one sync cycle, panicking unless it completes.
pub fn cycle(device: &TestDevice) -> SyncReport {
    match device.sync_now().expect("sync cycle failed") {
        SyncOutcome::Completed(report) => report,
        other => panic!("expected a completed cycle, got {other:?}"),
    }
}

/// Asserts that every device holds identical contents in every
/// synchronized table.
pub fn assert_converged(devices: &[&TestDevice]) {
    let (first, rest) = match devices.split_first() {
        Some(split) => split,
        None => return,
    };

    for table in Table::KNOWN {
        let expected = first.store().get_all(table);
        for device in rest {
            assert_eq!(
                device.store().get_all(table),
                expected,
                "table {} diverged between devices",
                table
            );
        }
    }
}
