//! # Fieldsync Testkit
//!
//! Shared machinery for tests across the fieldsync crates.
//!
//! Three pieces live here: ready-made fixtures (records, outbox entries,
//! populated stores), proptest generators for the protocol types, and
//! [`integration::SyncHarness`], which wires real coordinators to a real
//! in-process service so multi-device scenarios run without a network.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use fieldsync_testkit::prelude::*;
//!
//! #[test]
//! fn two_devices_share_a_server() {
//!     let harness = SyncHarness::new();
//!     let alpha = harness.device();
//!     let beta = harness.device();
//!     // ... drive cycles on each and assert convergence
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod integration;

/// One-stop imports for test modules.
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::integration::*;
}

pub use fixtures::*;
pub use generators::*;
pub use integration::*;
