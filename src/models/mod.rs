//! Core data models for courier.
//!
//! Epistemic mapping:
//! - K_i (Knowledge): Identifiers and updates with compile-time guarantees
//! - B_i (Beliefs): Storage and lookups wrapped in Result/Option
//! - I^R (Resolvable): Config parameters

mod config;
mod error;
mod ids;
mod update;

pub use config::*;
pub use error::*;
pub use ids::*;
pub use update::*;
