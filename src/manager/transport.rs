//! Outbound transport to the coordinator.

use crate::models::{CourierError, Result, StatusUpdate};
use tokio::sync::mpsc;

/// Sends status updates to the coordinator.
///
/// `send` must not block: it hands the update off and returns. Failures are
/// logged by the manager and covered by the retry timer.
pub trait Transport: Send + Sync {
    fn send(&self, coordinator: &str, update: &StatusUpdate) -> Result<()>;
}

/// An update handed to the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    pub coordinator: String,
    pub update: StatusUpdate,
}

/// Transport that pushes every send into an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<Outbound>,
}

impl ChannelTransport {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Transport for ChannelTransport {
    fn send(&self, coordinator: &str, update: &StatusUpdate) -> Result<()> {
        self.tx
            .send(Outbound {
                coordinator: coordinator.to_string(),
                update: update.clone(),
            })
            .map_err(|_| CourierError::ChannelClosed)
    }
}
