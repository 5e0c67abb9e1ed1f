//! # Fieldsync Protocol
//!
//! Wire types for the fieldsync synchronization protocol.
//!
//! This crate defines everything both sides of a sync conversation agree
//! on, and nothing else:
//!
//! - The table registry: which tables synchronize and which secondary
//!   indexes each one carries ([`Table`], [`TableSpec`])
//! - Change records, outbox entries, and cursors ([`ChangeRecord`],
//!   [`OutboxEntry`], [`SyncCursor`])
//! - Request/response messages for the four sync endpoints
//! - JSON encode/decode helpers ([`wire`])
//!
//! Payloads are opaque JSON documents; the protocol interprets only the
//! envelope (table, record id, operation, version). All wire field names
//! are camelCase.
//!
//! ## Forward compatibility
//!
//! Unknown table or operation names decode into explicit `Unknown`
//! variants instead of failing the whole message. Appliers skip such
//! records one at a time.

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Protocol crate version, reported by the CLI tools.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

mod change;
mod cursor;
mod error;
mod messages;
mod outbox;
mod table;
mod time;
pub mod wire;

pub use change::{ChangeRecord, Operation};
pub use cursor::SyncCursor;
pub use error::{ProtocolError, ProtocolResult};
pub use messages::{
    endpoints, ConflictReport, ConflictRequest, CursorRepairRequest, ProposedChange, PullRequest,
    PullResponse, PushReceipt, PushRequest, CONFLICT_ERROR_PREFIX,
};
pub use outbox::OutboxEntry;
pub use table::{IndexSpec, Table, TableSpec, TABLES};
pub use time::now_millis;
