//! # Fieldsync Storage
//!
//! Append-only byte stores and the framed journal built on top of them.
//!
//! Everything fieldsync persists flows through this crate. At the bottom
//! sits [`StorageBackend`], a narrow trait over an append-only run of
//! bytes, with [`FileBackend`] for durable journals and
//! [`InMemoryBackend`] for tests and throwaway stores. On top of a backend,
//! [`Journal`] adds length-prefixed, checksummed frames with torn-tail
//! recovery. The client-side local store and the server-side change log
//! both keep their state as journal frames.
//!
//! Backends never interpret their contents. A backend cannot tell a change
//! record from an outbox entry, which keeps the durability code identical
//! on both ends of the sync pipeline.
//!
//! ```rust
//! use fieldsync_storage::{InMemoryBackend, Journal};
//!
//! let journal = Journal::new(Box::new(InMemoryBackend::new()), false);
//! journal.append(1, b"payload").unwrap();
//!
//! let recovery = journal.recover().unwrap();
//! assert_eq!(recovery.frames.len(), 1);
//! assert_eq!(recovery.frames[0].payload, b"payload");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod journal;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use journal::{Journal, JournalFrame, Recovery};
pub use memory::InMemoryBackend;
