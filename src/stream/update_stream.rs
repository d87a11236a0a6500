//! Per-task status update stream.
//!
//! Epistemic foundation:
//! - K_i: Checkpoint before apply; a failed write leaves memory untouched
//! - K_i: Once errored, a stream stays errored and does no further I/O
//! - B_i: Redelivered updates and acks are expected → no-ops, not errors
//! - K_i: An ack for anything but the pending head is a caller bug (fatal)

use super::state::{Admission, DeliveryState};
use crate::checkpoint::{CheckpointLog, CheckpointRecord, LogStorage};
use crate::models::{CourierError, Result, StatusUpdate, StreamKey, UpdateUuid};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Delivery state machine for one (task, framework) pair.
pub struct UpdateStream {
    key: StreamKey,
    log: Option<CheckpointLog>,
    state: DeliveryState,
    /// Latched non-retryable error
    error: Option<String>,
}

impl UpdateStream {
    /// Create a fresh stream, opening its update log if `path` is given.
    ///
    /// A setup failure does not fail construction; it is latched and
    /// returned by every later call.
    pub fn new(key: StreamKey, path: Option<PathBuf>, storage: &dyn LogStorage) -> Self {
        let mut stream = Self {
            key,
            log: None,
            state: DeliveryState::new(),
            error: None,
        };

        if let Some(path) = path {
            match CheckpointLog::open(storage, &path) {
                Ok(log) => stream.log = Some(log),
                Err(e) => {
                    stream.latch(e);
                }
            }
        }

        stream
    }

    /// Rebuild a stream from an existing update log and keep appending to it.
    pub fn recover(key: StreamKey, path: &Path, storage: &dyn LogStorage) -> Result<Self> {
        let (log, decoded) = CheckpointLog::reopen(storage, path)?;
        let state = DeliveryState::replay(&decoded.records)?;

        info!(
            stream = %key,
            records = decoded.records.len(),
            pending = state.pending().len(),
            "Recovered status update stream"
        );

        Ok(Self {
            key,
            log: Some(log),
            state,
            error: None,
        })
    }

    /// Handle an incoming status update.
    ///
    /// Returns `Ok(true)` if the update was new and is now queued,
    /// `Ok(false)` if it was a duplicate and nothing happened.
    pub fn update(&mut self, update: StatusUpdate) -> Result<bool> {
        self.ensure_active()?;

        match self.state.admit(&update.uuid) {
            Admission::AlreadyAcknowledged => {
                warn!(
                    update = %update,
                    "Ignoring status update that has already been acknowledged"
                );
                Ok(false)
            }
            Admission::Duplicate => {
                warn!(update = %update, "Ignoring duplicate status update");
                Ok(false)
            }
            Admission::New => {
                self.checkpoint(CheckpointRecord::Update {
                    update: update.clone(),
                })?;
                debug!(update = %update, "Queued status update");
                self.state.apply_update(update);
                Ok(true)
            }
        }
    }

    /// Handle an acknowledgement of `uuid`, given the head the caller expects
    /// it to settle.
    ///
    /// Returns `Ok(true)` if the head was acknowledged and popped,
    /// `Ok(false)` for a repeat of an ack already processed.
    pub fn acknowledgement(
        &mut self,
        uuid: &UpdateUuid,
        expected: Option<&StatusUpdate>,
    ) -> Result<bool> {
        self.ensure_active()?;

        if !self.state.check_ack(uuid, expected)? {
            warn!(stream = %self.key, uuid = %uuid, "Ignoring duplicate acknowledgement");
            return Ok(false);
        }

        self.checkpoint(CheckpointRecord::Ack { uuid: *uuid })?;
        self.state.apply_ack(*uuid);
        debug!(stream = %self.key, uuid = %uuid, "Acknowledged status update");
        Ok(true)
    }

    /// The next update to send, or `None` if nothing is pending or the
    /// stream has errored.
    pub fn next(&self) -> Option<&StatusUpdate> {
        if self.error.is_some() {
            return None;
        }
        self.state.head()
    }

    pub fn state(&self) -> &DeliveryState {
        &self.state
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_checkpointed(&self) -> bool {
        self.log.is_some()
    }

    fn ensure_active(&self) -> Result<()> {
        match &self.error {
            Some(e) => Err(CourierError::Terminal(e.clone())),
            None => Ok(()),
        }
    }

    fn checkpoint(&mut self, record: CheckpointRecord) -> Result<()> {
        let Some(log) = self.log.as_mut() else {
            return Ok(());
        };

        match log.append(&record) {
            Ok(()) => Ok(()),
            Err(e) => Err(self.latch(e)),
        }
    }

    fn latch(&mut self, cause: CourierError) -> CourierError {
        let message = cause.to_string();
        error!(stream = %self.key, error = %message, "Status update stream failed");
        self.error = Some(message.clone());
        CourierError::Terminal(message)
    }
}
