//! Checkpoint module for durable status update streams.
//!
//! Provides:
//! - `CheckpointRecord`: UPDATE/ACK records and their framing
//! - `CheckpointLog`: Append-only, synced log of one task's updates
//! - `LogStorage`: Filesystem capability the log is written through
//! - `discover_logs`: Finds logs left by a previous run

mod discover;
mod log;
mod record;
mod storage;

pub use discover::*;
pub use log::*;
pub use record::*;
pub use storage::*;
