//! The table registry.
//!
//! Synchronized tables are a closed set known at compile time. Matching on
//! [`Table`] stays exhaustive, with [`Table::Unknown`] as the explicit
//! forward-compatibility arm for names introduced by newer peers.

use serde::{Deserialize, Serialize};

/// A synchronized business table.
///
/// Wire names are snake_case strings (`"work_orders"`, `"customers"`,
/// `"products"`). Any other name decodes to [`Table::Unknown`] so a single
/// unrecognized record cannot poison a whole batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    /// Field-service work orders.
    WorkOrders,
    /// Customer master records.
    Customers,
    /// Product/inventory records.
    Products,
    /// A table name this build does not recognize. Never constructed
    /// locally; only produced by decoding.
    #[serde(other)]
    Unknown,
}

impl Table {
    /// All tables this build synchronizes.
    pub const KNOWN: [Table; 3] = [Table::WorkOrders, Table::Customers, Table::Products];

    /// Returns the canonical wire name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Table::WorkOrders => "work_orders",
            Table::Customers => "customers",
            Table::Products => "products",
            Table::Unknown => "unknown",
        }
    }

    /// Resolves a wire name to a known table.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "work_orders" => Some(Table::WorkOrders),
            "customers" => Some(Table::Customers),
            "products" => Some(Table::Products),
            _ => None,
        }
    }

    /// True for every table except [`Table::Unknown`].
    #[must_use]
    pub fn is_known(self) -> bool {
        !matches!(self, Table::Unknown)
    }

    /// Returns the registry entry for this table, if it is known.
    #[must_use]
    pub fn spec(self) -> Option<&'static TableSpec> {
        TABLES.iter().find(|spec| spec.table == self)
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A secondary index over one payload field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexSpec {
    /// Index name, used in lookups.
    pub name: &'static str,
    /// The payload field the index extracts (string-valued).
    pub field: &'static str,
}

/// Registry entry for one synchronized table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSpec {
    /// The table this entry describes.
    pub table: Table,
    /// Secondary indexes maintained for the table.
    pub indexes: &'static [IndexSpec],
}

/// The full table registry, resolved once at compile time.
pub const TABLES: &[TableSpec] = &[
    TableSpec {
        table: Table::WorkOrders,
        indexes: &[
            IndexSpec {
                name: "by-status",
                field: "status",
            },
            IndexSpec {
                name: "by-customer",
                field: "customerId",
            },
        ],
    },
    TableSpec {
        table: Table::Customers,
        indexes: &[IndexSpec {
            name: "by-document",
            field: "document",
        }],
    },
    TableSpec {
        table: Table::Products,
        indexes: &[IndexSpec {
            name: "by-sku",
            field: "sku",
        }],
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_are_snake_case() {
        assert_eq!(
            serde_json::to_value(Table::WorkOrders).unwrap(),
            serde_json::json!("work_orders")
        );
        assert_eq!(
            serde_json::to_value(Table::Products).unwrap(),
            serde_json::json!("products")
        );
    }

    #[test]
    fn unknown_names_decode_to_fallback() {
        let table: Table = serde_json::from_value(serde_json::json!("invoices")).unwrap();
        assert_eq!(table, Table::Unknown);
        assert!(!table.is_known());
    }

    #[test]
    fn from_name_resolves_known_tables() {
        assert_eq!(Table::from_name("customers"), Some(Table::Customers));
        assert_eq!(Table::from_name("invoices"), None);
    }

    #[test]
    fn every_known_table_has_a_spec() {
        for table in Table::KNOWN {
            let spec = table.spec().unwrap();
            assert_eq!(spec.table, table);
            assert!(!spec.indexes.is_empty());
        }
        assert!(Table::Unknown.spec().is_none());
    }

    #[test]
    fn work_orders_index_fields() {
        let spec = Table::WorkOrders.spec().unwrap();
        let fields: Vec<_> = spec.indexes.iter().map(|i| i.field).collect();
        assert_eq!(fields, vec!["status", "customerId"]);
    }
}
