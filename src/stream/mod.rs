//! Status update streams.
//!
//! Provides:
//! - `DeliveryState`: Pending queue and dedup sets, with the transition rules
//!   shared by live handling and log replay
//! - `UpdateStream`: Per-task state machine owning its checkpoint log

mod state;
mod update_stream;

pub use state::*;
pub use update_stream::*;
