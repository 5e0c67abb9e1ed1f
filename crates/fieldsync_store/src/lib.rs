//! # Fieldsync Store
//!
//! Durable offline store for fieldsync client devices.
//!
//! [`LocalStore`] keeps a journaled record cache per table, rebuilt by
//! replay on open, alongside the outbox queue of local writes awaiting
//! sync, secondary equality indexes from the protocol table registry,
//! and device settings with the mirrored sync cursor.
//!
//! Local writes enqueue outbox entries automatically; changes applied
//! from the server bypass the outbox so pulls are never echoed back
//! as pushes.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod dir;
mod error;
mod index;
mod record;
mod store;

pub use config::StoreConfig;
pub use dir::StoreDir;
pub use error::{StoreError, StoreResult};
pub use index::TableIndexes;
pub use record::{StoreRecord, StoreRecordKind};
pub use store::{LocalStore, DEVICE_ID_KEY};
