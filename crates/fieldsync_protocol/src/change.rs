//! Change records and operations.

use crate::table::Table;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The kind of mutation a change carries.
///
/// Wire names are uppercase (`"INSERT"`, `"UPDATE"`, `"DELETE"`). Anything
/// else decodes to [`Operation::Unknown`], which appliers skip per record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    /// A record was created.
    Insert,
    /// A record was modified.
    Update,
    /// A record was removed.
    Delete,
    /// An operation this build does not recognize. Never constructed
    /// locally; only produced by decoding.
    #[serde(other)]
    Unknown,
}

impl Operation {
    /// Returns the canonical wire name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Operation::Insert => "INSERT",
            Operation::Update => "UPDATE",
            Operation::Delete => "DELETE",
            Operation::Unknown => "UNKNOWN",
        }
    }

    /// True for every operation except [`Operation::Unknown`].
    #[must_use]
    pub fn is_known(self) -> bool {
        !matches!(self, Operation::Unknown)
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One row of the server change log.
///
/// The payload is the full post-mutation field set of the record, not a
/// diff, so applying a change never needs the preceding state. `version`
/// totally orders the log; `created_at` is informational only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRecord {
    /// The table the change applies to.
    pub table: Table,
    /// Identifier of the changed record within its table.
    pub record_id: String,
    /// The kind of mutation.
    pub operation: Operation,
    /// Full post-mutation field set; absent for deletes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    /// Position in the total order of the change log.
    pub version: u64,
    /// Server wall-clock time of the append, unix milliseconds.
    pub created_at: u64,
}

impl ChangeRecord {
    /// Creates a change record.
    pub fn new(
        table: Table,
        record_id: impl Into<String>,
        operation: Operation,
        payload: Option<Value>,
        version: u64,
        created_at: u64,
    ) -> Self {
        Self {
            table,
            record_id: record_id.into(),
            operation,
            payload,
            version,
            created_at,
        }
    }

    /// True when this change removes its record.
    #[must_use]
    pub fn is_delete(&self) -> bool {
        self.operation == Operation::Delete
    }

    /// Returns the `(table, record_id)` identity of the changed record.
    #[must_use]
    pub fn key(&self) -> (Table, String) {
        (self.table, self.record_id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn operation_wire_names_are_uppercase() {
        assert_eq!(serde_json::to_value(Operation::Insert).unwrap(), json!("INSERT"));
        assert_eq!(serde_json::to_value(Operation::Delete).unwrap(), json!("DELETE"));
    }

    #[test]
    fn unknown_operation_decodes_to_fallback() {
        let op: Operation = serde_json::from_value(json!("MERGE")).unwrap();
        assert_eq!(op, Operation::Unknown);
        assert!(!op.is_known());
    }

    #[test]
    fn change_record_wire_shape() {
        let record = ChangeRecord::new(
            Table::WorkOrders,
            "wo-17",
            Operation::Update,
            Some(json!({"id": "wo-17", "status": "done"})),
            42,
            1_700_000_000_000,
        );

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(
            value,
            json!({
                "table": "work_orders",
                "recordId": "wo-17",
                "operation": "UPDATE",
                "payload": {"id": "wo-17", "status": "done"},
                "version": 42,
                "createdAt": 1_700_000_000_000u64,
            })
        );
    }

    #[test]
    fn delete_omits_payload() {
        let record = ChangeRecord::new(
            Table::Products,
            "sku-9",
            Operation::Delete,
            None,
            7,
            1,
        );
        assert!(record.is_delete());

        let value = serde_json::to_value(&record).unwrap();
        assert!(value.get("payload").is_none());
    }

    #[test]
    fn decodes_record_with_unknown_table() {
        let record: ChangeRecord = serde_json::from_value(json!({
            "table": "invoices",
            "recordId": "inv-1",
            "operation": "INSERT",
            "payload": {"id": "inv-1"},
            "version": 3,
            "createdAt": 10,
        }))
        .unwrap();

        assert_eq!(record.table, Table::Unknown);
        assert_eq!(record.operation, Operation::Insert);
    }
}
