//! Error types for courier.
//!
//! Epistemic taxonomy:
//! - B_i falsified: Expected failures (unknown stream, bad input)
//! - I^B materialized: Storage failures (setup, durable append)
//! - K_i violated: Protocol invariant broken by the caller (fatal)

use super::UpdateUuid;
use thiserror::Error;

/// Top-level error type for courier.
#[derive(Debug, Error)]
pub enum CourierError {
    // ═══════════════════════════════════════════════════════════════════
    // B_i FALSIFIED — Belief proven wrong (expected failures)
    // ═══════════════════════════════════════════════════════════════════

    #[error("Configuration error: {0}")]
    Config(#[from] super::ConfigError),

    #[error("Cannot find the status update stream for task {task_id} of framework {framework_id}")]
    StreamNotFound {
        task_id: String,
        framework_id: String,
    },

    #[error("Status update stream already exists for task {task_id} of framework {framework_id}")]
    StreamExists {
        task_id: String,
        framework_id: String,
    },

    #[error("Parse error: {0}")]
    Parse(String),

    // ═══════════════════════════════════════════════════════════════════
    // I^B MATERIALIZED — Storage became known-bad
    // ═══════════════════════════════════════════════════════════════════

    #[error("{0}")]
    Setup(String),

    #[error("{0}")]
    Checkpoint(String),

    /// Error latched by a stream; every later call returns the same message.
    #[error("{0}")]
    Terminal(String),

    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // ═══════════════════════════════════════════════════════════════════
    // K_i VIOLATED — Invariant broken (bug in the caller's ordering)
    // ═══════════════════════════════════════════════════════════════════

    #[error("{}", protocol_violation_message(.expected, .received))]
    ProtocolViolation {
        expected: Option<UpdateUuid>,
        received: UpdateUuid,
    },

    #[error("Update manager is no longer running")]
    ChannelClosed,

    #[error("Internal error: {0}")]
    Internal(String),
}

fn protocol_violation_message(expected: &Option<UpdateUuid>, received: &UpdateUuid) -> String {
    match expected {
        Some(expected) => {
            format!("Unexpected UUID mismatch! (received {received}, expecting {expected})")
        }
        None => format!("Unexpected acknowledgement {received}: no pending status update"),
    }
}

impl CourierError {
    /// Create an IO error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Whether this error means the component can no longer be trusted.
    ///
    /// Fatal errors are never latched into a stream; callers should stop
    /// driving the component that produced them.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ProtocolViolation { .. } | Self::ChannelClosed)
    }
}

/// Result type alias for courier.
pub type Result<T> = std::result::Result<T, CourierError>;
