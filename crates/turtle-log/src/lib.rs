//! Append-only, field-level event log for Turtle.
//!
//! This crate provides:
//! - The [`EventLog`] trait: the narrow contract the engine consumes
//! - [`InMemoryEventLog`] for tests and embedding
//! - [`WalEventLog`], which persists each appended batch as one framed
//!   write-ahead-log record and replays it on open
//! - [`LogTransaction`], a unit of work that buffers appends, answers
//!   queries over base plus buffered events, and commits in one append

pub mod durable;
pub mod error;
pub mod memory;
pub mod traits;
pub mod transaction;
pub mod wal;

pub use durable::WalEventLog;
pub use error::{LogError, LogResult};
pub use memory::InMemoryEventLog;
pub use traits::{EventLog, ValuePredicate};
pub use transaction::LogTransaction;
pub use wal::{SyncMode, WalConfig, WriteAheadLog};
