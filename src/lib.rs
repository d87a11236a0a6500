//! courier - Reliable delivery of task status updates to a coordinator.
//!
//! ## Architecture
//!
//! - **CheckpointLog**: Append-only, synced record of one task's updates and acks
//! - **UpdateStream**: Per-(task, framework) pending queue, dedup sets and
//!   terminal-error latch
//! - **RetryScheduler**: Single-shot resend timer per stream
//! - **UpdateManager**: Single serialization context owning every stream
//!
//! ## Delivery Semantics
//!
//! - At-least-once towards the coordinator, idempotent on redelivery
//! - Checkpoint before apply: a record is durable before memory changes
//! - FIFO: only the oldest pending update is in flight, and only it can be
//!   acknowledged
//!
//! ## Epistemic Design
//!
//! - K_i (Knowledge): Protocol invariants (FIFO acks, grow-only sets)
//! - B_i (Beliefs): Storage and lookups (Result, Option)
//! - I^R (Resolvable): Retry interval and checkpoint location
//! - I^B (Bounded): Coordinator reachability (resend until acknowledged)

pub mod checkpoint;
pub mod manager;
pub mod models;
pub mod stream;

// Re-exports for convenience
pub use checkpoint::{CheckpointLog, CheckpointRecord, FsLogStorage, LogStorage};
pub use manager::{ChannelTransport, Outbound, StreamSnapshot, Transport, UpdateManager};
pub use models::{
    Config, CourierError, FrameworkId, Result, StatusUpdate, StreamKey, TaskId, TaskState,
    TaskStatus, UpdateUuid,
};
pub use stream::{DeliveryState, UpdateStream};
