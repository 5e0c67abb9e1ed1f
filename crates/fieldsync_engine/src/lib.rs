//! Client-side sync coordination for fieldsync devices.
//!
//! [`SyncCoordinator`] owns a device's sync cycle. Each cycle pushes
//! before it pulls: pending outbox entries go up first, the server judges
//! each one against history behind the device's cursor, and entries it
//! rejects as conflicts are dropped because the server's record stands.
//! New changes then come down in version order, the cursor advancing only
//! after each fully applied page. Pushing alone never moves the cursor,
//! so a device that only writes keeps receiving the history behind its
//! own changes, and applying a pulled change never re-enqueues it for
//! push.
//!
//! Around the coordinator sit [`SyncScheduler`] for periodic cycles,
//! [`RetryConfig`]-driven exponential backoff for flaky links,
//! [`HttpTransport`] with a [`LoopbackClient`] for tests, and
//! [`StatusFeed`] for reactive UI updates. At most one cycle runs at a
//! time; sync requests that land mid-cycle collapse into the next run.
//! The cursor mirrors the server's and never moves backward, except for
//! the deliberate rewind that starts a full resync.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod coordinator;
mod device;
mod error;
mod http;
mod scheduler;
mod state;
mod status;
mod transport;

pub use config::{RetryConfig, SyncConfig};
pub use coordinator::SyncCoordinator;
pub use device::{load_or_create_device_id, DEVICE_ID_KEY};
pub use error::{EngineError, EngineResult};
pub use http::{HttpClient, HttpTransport, LoopbackClient, LoopbackServer};
pub use scheduler::SyncScheduler;
pub use state::{SyncOutcome, SyncReport, SyncState, SyncStatus};
pub use status::StatusFeed;
pub use transport::{MockTransport, SyncTransport};
