//! # Fieldsync Server
//!
//! The server half of the fieldsync protocol: an append-only change
//! log with dense monotonic versions, per-device cursors, push-time
//! conflict detection, and the four sync endpoint handlers.
//!
//! The main types:
//! - [`SyncService`]: journaled change log plus cursors behind one
//!   writer lock, with pull, push, conflict preview, and cursor repair
//!   handlers
//! - [`ChangeLog`]: version assignment, pagination, retention sweeps,
//!   and the latest-state map that survives them
//! - [`ConflictPolicy`]: what happens to a pushed change that lands
//!   behind newer server state
//!
//! The service is transport-agnostic. [`SyncService::handle`] maps
//! `(method, path, body)` to the endpoint handlers; an HTTP listener or
//! an in-process loopback client supplies the bytes.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod change_log;
mod config;
mod conflict;
mod cursors;
mod error;
mod journal;
mod service;

pub use change_log::ChangeLog;
pub use config::ServerConfig;
pub use conflict::ConflictPolicy;
pub use cursors::CursorManager;
pub use error::{ServerError, ServerResult};
pub use journal::{LogRecord, LogRecordKind, ServerDir};
pub use service::SyncService;
