//! Proptest strategies for sync histories.
//!
//! Random tables, record ids, and mutation batches, plus a helper
//! for sizing a property run.

use fieldsync_protocol::{ChangeRecord, Operation, Table};
use proptest::prelude::*;
use serde_json::{json, Value};
use std::ops::Range;

/// Picks one of the known tables.
pub fn table_strategy() -> impl Strategy<Value = Table> {
    prop::sample::select(Table::KNOWN.to_vec())
}

/// Picks one of the three change operations.
pub fn operation_strategy() -> impl Strategy<Value = Operation> {
    prop_oneof![
        Just(Operation::Insert),
        Just(Operation::Update),
        Just(Operation::Delete),
    ]
}

/// Short word-and-number record ids like `wo-17`.
pub fn record_id_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z]{2,5}-[0-9]{1,3}").expect("id pattern parses")
}

/// A generated sync mutation, before the log assigns it a version.
#[derive(Debug, Clone)]
pub enum Mutation {
    /// Write the full record state
    Put {
        /// Target table
        table: Table,
        /// Record identifier
        record_id: String,
        /// Full post-mutation field set
        payload: Value,
    },
    /// Remove the record
    Delete {
        /// Target table
        table: Table,
        /// Record identifier
        record_id: String,
    },
}

impl Mutation {
    /// Returns the `(table, record_id)` identity the mutation targets.
    #[must_use]
    pub fn key(&self) -> (Table, String) {
        match self {
            Mutation::Put {
                table, record_id, ..
            }
            | Mutation::Delete { table, record_id } => (*table, record_id.clone()),
        }
    }

    /// Builds the change record for this mutation at `version`.
    #[must_use]
    pub fn into_change(self, version: u64, created_at: u64) -> ChangeRecord {
        match self {
            Mutation::Put {
                table,
                record_id,
                payload,
            } => ChangeRecord::new(
                table,
                record_id,
                Operation::Update,
                Some(payload),
                version,
                created_at,
            ),
            Mutation::Delete { table, record_id } => ChangeRecord::new(
                table,
                record_id,
                Operation::Delete,
                None,
                version,
                created_at,
            ),
        }
    }
}

/// Single mutations, three writes for every delete.
pub fn mutation_strategy() -> impl Strategy<Value = Mutation> {
    prop_oneof![
        3 => (table_strategy(), record_id_strategy(), 0u32..1000).prop_map(
            |(table, record_id, revision)| Mutation::Put {
                table,
                payload: json!({"id": &record_id, "revision": revision}),
                record_id,
            }
        ),
        1 => (table_strategy(), record_id_strategy())
            .prop_map(|(table, record_id)| Mutation::Delete { table, record_id }),
    ]
}

/// Batches of mutations whose length falls within `len`.
pub fn mutation_sequence_strategy(len: Range<usize>) -> impl Strategy<Value = Vec<Mutation>> {
    prop::collection::vec(mutation_strategy(), len)
}

/// Proptest settings running `cases` cases with shrinking capped
/// at a few hundred iterations.
#[must_use]
pub fn bounded_cases(cases: u32) -> ProptestConfig {
    ProptestConfig {
        cases,
        max_shrink_iters: 400,
        ..ProptestConfig::default()
    }
}
