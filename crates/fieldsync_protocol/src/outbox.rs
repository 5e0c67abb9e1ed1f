//! Outbox entries.

use crate::change::Operation;
use crate::table::Table;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A locally queued mutation awaiting push.
///
/// `local_id` is assigned by the device's outbox and is unique per device;
/// together with the device id it forms the idempotency key for retried
/// pushes. `acknowledged` is client-local bookkeeping and is ignored by the
/// server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboxEntry {
    /// Device-local identifier, monotonically assigned by the outbox.
    pub local_id: u64,
    /// The table the mutation applies to.
    pub table: Table,
    /// Identifier of the mutated record within its table.
    pub record_id: String,
    /// The kind of mutation.
    pub operation: Operation,
    /// Full post-mutation field set; absent for deletes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    /// Device wall-clock time the entry was queued, unix milliseconds.
    pub queued_at: u64,
    /// True once the server has accepted the entry.
    #[serde(default)]
    pub acknowledged: bool,
}

impl OutboxEntry {
    /// Creates an entry carrying an insert or update.
    pub fn mutation(
        local_id: u64,
        table: Table,
        record_id: impl Into<String>,
        operation: Operation,
        payload: Value,
        queued_at: u64,
    ) -> Self {
        Self {
            local_id,
            table,
            record_id: record_id.into(),
            operation,
            payload: Some(payload),
            queued_at,
            acknowledged: false,
        }
    }

    /// Creates an entry carrying a delete.
    pub fn deletion(
        local_id: u64,
        table: Table,
        record_id: impl Into<String>,
        queued_at: u64,
    ) -> Self {
        Self {
            local_id,
            table,
            record_id: record_id.into(),
            operation: Operation::Delete,
            payload: None,
            queued_at,
            acknowledged: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn mutation_carries_payload() {
        let entry = OutboxEntry::mutation(
            1,
            Table::Customers,
            "c-3",
            Operation::Insert,
            json!({"id": "c-3", "name": "Acme"}),
            50,
        );
        assert_eq!(entry.operation, Operation::Insert);
        assert!(entry.payload.is_some());
        assert!(!entry.acknowledged);
    }

    #[test]
    fn deletion_has_no_payload() {
        let entry = OutboxEntry::deletion(2, Table::Products, "p-1", 60);
        assert_eq!(entry.operation, Operation::Delete);
        assert!(entry.payload.is_none());
    }

    #[test]
    fn acknowledged_defaults_to_false_on_decode() {
        let entry: OutboxEntry = serde_json::from_value(json!({
            "localId": 9,
            "table": "work_orders",
            "recordId": "wo-2",
            "operation": "UPDATE",
            "payload": {"id": "wo-2"},
            "queuedAt": 123,
        }))
        .unwrap();

        assert_eq!(entry.local_id, 9);
        assert!(!entry.acknowledged);
    }

    #[test]
    fn wire_field_names_are_camel_case() {
        let entry = OutboxEntry::deletion(4, Table::WorkOrders, "wo-8", 99);
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(
            value,
            json!({
                "localId": 4,
                "table": "work_orders",
                "recordId": "wo-8",
                "operation": "DELETE",
                "queuedAt": 99,
                "acknowledged": false,
            })
        );
    }
}
