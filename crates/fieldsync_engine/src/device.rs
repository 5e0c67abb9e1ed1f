//! Device identity.
//!
//! Every device carries a stable random identifier. The server keys its
//! cursors and push idempotency ledger by this id, so it must survive
//! restarts; it lives in the store's settings area and is minted once.

use crate::error::EngineResult;
use fieldsync_store::LocalStore;
use uuid::Uuid;

pub use fieldsync_store::DEVICE_ID_KEY;

/// Loads the device id, minting and persisting one on first use.
pub fn load_or_create_device_id(store: &LocalStore) -> EngineResult<String> {
    if let Some(id) = store.setting(DEVICE_ID_KEY) {
        return Ok(id);
    }
    let id = Uuid::new_v4().to_string();
    store.put_setting(DEVICE_ID_KEY, &id)?;
    tracing::info!(device_id = %id, "minted new device id");
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_id_is_stable_across_calls() {
        let store = LocalStore::open_in_memory().unwrap();
        let first = load_or_create_device_id(&store).unwrap();
        let second = load_or_create_device_id(&store).unwrap();
        assert_eq!(first, second);
        assert!(!first.is_empty());
    }

    #[test]
    fn distinct_stores_get_distinct_ids() {
        let a = LocalStore::open_in_memory().unwrap();
        let b = LocalStore::open_in_memory().unwrap();
        let id_a = load_or_create_device_id(&a).unwrap();
        let id_b = load_or_create_device_id(&b).unwrap();
        assert_ne!(id_a, id_b);
    }
}
