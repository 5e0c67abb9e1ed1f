//! Test fixtures and store helpers.
//!
//! Provides convenience functions for setting up test stores and
//! payloads for the synchronized tables.

use fieldsync_store::LocalStore;
use serde_json::{json, Value};
use std::path::Path;
use tempfile::TempDir;

/// A test store with automatic cleanup.
pub struct TestStore {
    /// The store instance.
    pub store: LocalStore,
    /// Keeps the backing directory alive until the store is dropped.
    _temp_dir: Option<TempDir>,
}

impl TestStore {
    /// Creates a new in-memory test store.
    pub fn memory() -> Self {
        Self {
            store: LocalStore::open_in_memory().expect("open in-memory store"),
            _temp_dir: None,
        }
    }

    /// Creates a new file-based test store.
    pub fn file() -> Self {
        let temp_dir = TempDir::new().expect("create temp dir");
        let store = LocalStore::open(&temp_dir.path().join("store")).expect("open file store");

        Self {
            store,
            _temp_dir: Some(temp_dir),
        }
    }

    /// Returns the store path if file-based, None if in-memory.
    pub fn path(&self) -> Option<&Path> {
        self.store.path()
    }
}

impl std::ops::Deref for TestStore {
    type Target = LocalStore;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

/// Runs `f` against a fresh in-memory store.
///
/// ```rust,ignore
/// with_temp_store(|store| {
///     store.put(Table::WorkOrders, work_order("wo-1", "open")).unwrap();
///     assert_eq!(store.pending_count(), 1);
/// });
/// ```
pub fn with_temp_store<F, R>(f: F) -> R
where
    F: FnOnce(&LocalStore) -> R,
{
    let test_store = TestStore::memory();
    f(&test_store.store)
}

/// Runs `f` against a store backed by a temporary directory.
pub fn with_file_store<F, R>(f: F) -> R
where
    F: FnOnce(&LocalStore, &Path) -> R,
{
    let test_store = TestStore::file();
    let path = test_store
        .path()
        .expect("file store has a path")
        .to_path_buf();
    f(&test_store.store, &path)
}

/// Builds a work order payload with its indexed fields populated.
pub fn work_order(id: &str, status: &str) -> Value {
    json!({
        "id": id,
        "status": status,
        "customerId": "c-1",
        "title": "pump inspection",
    })
}

/// Builds a work order payload for a specific customer.
pub fn work_order_for(id: &str, status: &str, customer_id: &str) -> Value {
    json!({
        "id": id,
        "status": status,
        "customerId": customer_id,
        "title": "pump inspection",
    })
}

/// Builds a customer payload with its indexed fields populated.
pub fn customer(id: &str, name: &str) -> Value {
    json!({
        "id": id,
        "name": name,
        "document": format!("doc-{id}"),
    })
}

/// Builds a product payload with its indexed fields populated.
pub fn product(id: &str, sku: &str) -> Value {
    json!({
        "id": id,
        "sku": sku,
        "name": "hydraulic seal",
        "quantity": 10,
    })
}

/// Ready-made store populations.
pub mod scenarios {
    use super::*;
    use fieldsync_protocol::Table;

    /// Creates a store with `count` unsynced work orders queued in the
    /// outbox.
    pub fn populated_store(count: usize) -> TestStore {
        let test_store = TestStore::memory();

        for i in 0..count {
            test_store
                .store
                .put(Table::WorkOrders, work_order(&format!("wo-{i}"), "open"))
                .expect("queue work order");
        }

        test_store
    }

    /// Creates a store holding one record in every synchronized table.
    pub fn multi_table_store() -> TestStore {
        let test_store = TestStore::memory();

        test_store
            .store
            .put(Table::WorkOrders, work_order("wo-1", "open"))
            .expect("queue work order");
        test_store
            .store
            .put(Table::Customers, customer("c-1", "Acme Pumps"))
            .expect("queue customer");
        test_store
            .store
            .put(Table::Products, product("p-1", "SKU-100"))
            .expect("queue product");

        test_store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldsync_protocol::Table;

    #[test]
    fn memory_store_accepts_writes() {
        let test_store = TestStore::memory();
        test_store
            .put(Table::WorkOrders, work_order("wo-1", "open"))
            .unwrap();
        assert_eq!(test_store.pending_count(), 1);
    }

    #[test]
    fn file_store_has_a_path() {
        with_file_store(|store, path| {
            store
                .put(Table::Customers, customer("c-1", "Acme"))
                .unwrap();
            assert!(path.join("store.journal").exists());
        });
    }

    #[test]
    fn populated_scenario_queues_every_write() {
        let test_store = scenarios::populated_store(10);
        assert_eq!(test_store.pending_count(), 10);
        assert_eq!(test_store.get_all(Table::WorkOrders).len(), 10);
    }

    #[test]
    fn multi_table_scenario_covers_known_tables() {
        let test_store = scenarios::multi_table_store();
        for table in Table::KNOWN {
            assert_eq!(test_store.get_all(table).len(), 1);
        }
    }
}
