//! Secondary indexes over cached records.
//!
//! Indexes are internal access paths maintained atomically with every
//! write, never queried by ad-hoc names from outside the crate's
//! `find_by` surface. Each table's index set comes from the protocol
//! table registry, so every store instance indexes the same fields.

use fieldsync_protocol::{IndexSpec, Table};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Equality indexes for one table.
///
/// Stores a mapping from indexed field value to the set of record ids
/// holding that value (non-unique). Only string-valued fields are
/// indexed; records missing the field simply do not appear.
#[derive(Debug, Default)]
pub struct TableIndexes {
    /// Index specs, from the table registry.
    specs: &'static [IndexSpec],
    /// Index name to (field value to record ids).
    entries: BTreeMap<&'static str, BTreeMap<String, BTreeSet<String>>>,
}

impl TableIndexes {
    /// Creates the index set for a table.
    ///
    /// Tables without registered indexes (including unknown tables)
    /// get an empty set.
    #[must_use]
    pub fn for_table(table: Table) -> Self {
        let specs = table.spec().map_or(&[][..], |spec| spec.indexes);
        let entries = specs
            .iter()
            .map(|spec| (spec.name, BTreeMap::new()))
            .collect();
        Self { specs, entries }
    }

    /// Applies a record write, replacing any previous index entries.
    pub fn update(&mut self, record_id: &str, old: Option<&Value>, new: Option<&Value>) {
        for spec in self.specs {
            if let Some(key) = old.and_then(|payload| indexed_value(payload, spec.field)) {
                self.remove_entry(spec.name, &key, record_id);
            }
            if let Some(key) = new.and_then(|payload| indexed_value(payload, spec.field)) {
                self.insert_entry(spec.name, key, record_id);
            }
        }
    }

    /// Looks up record ids by index name and field value.
    ///
    /// Returns an empty vec for unknown index names or unmatched values.
    #[must_use]
    pub fn lookup(&self, index_name: &str, value: &str) -> Vec<String> {
        self.entries
            .get(index_name)
            .and_then(|index| index.get(value))
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// True when the table registers an index under this name.
    #[must_use]
    pub fn has_index(&self, index_name: &str) -> bool {
        self.entries.contains_key(index_name)
    }

    /// Drops all entries, keeping the registered index names.
    pub fn clear(&mut self) {
        for index in self.entries.values_mut() {
            index.clear();
        }
    }

    fn insert_entry(&mut self, index_name: &'static str, key: String, record_id: &str) {
        if let Some(index) = self.entries.get_mut(index_name) {
            index.entry(key).or_default().insert(record_id.to_string());
        }
    }

    fn remove_entry(&mut self, index_name: &'static str, key: &str, record_id: &str) {
        if let Some(index) = self.entries.get_mut(index_name) {
            if let Some(ids) = index.get_mut(key) {
                ids.remove(record_id);
                if ids.is_empty() {
                    index.remove(key);
                }
            }
        }
    }
}

/// Extracts the indexable value of a field, if present and a string.
fn indexed_value(payload: &Value, field: &str) -> Option<String> {
    payload.get(field).and_then(Value::as_str).map(String::from)
}
