//! Subcommand entry points, one module per command.

pub mod compact;
pub mod inspect;
pub mod log;
pub mod outbox;
pub mod sweep;
