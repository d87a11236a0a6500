//! In-memory delivery state of one stream and its transition rules.
//!
//! The same rules drive live updates/acknowledgements and log replay, which
//! is what makes a replayed log reproduce the state it was written from.

use crate::checkpoint::CheckpointRecord;
use crate::models::{CourierError, Result, StatusUpdate, UpdateUuid};
use std::collections::{HashSet, VecDeque};

/// How an incoming update relates to what the stream has already seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Never seen; must be checkpointed and queued
    New,
    /// Already acknowledged; redelivered after the ack was processed
    AlreadyAcknowledged,
    /// Already received and still (or previously) pending
    Duplicate,
}

/// Pending queue plus the two dedup sets.
///
/// K_i: `received` and `acknowledged` only grow.
/// K_i: `pending` is FIFO in arrival order; only its head can be acknowledged.
#[derive(Debug, Clone, Default)]
pub struct DeliveryState {
    pending: VecDeque<StatusUpdate>,
    received: HashSet<UpdateUuid>,
    acknowledged: HashSet<UpdateUuid>,
}

impl DeliveryState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify an update uuid.
    pub fn admit(&self, uuid: &UpdateUuid) -> Admission {
        if self.acknowledged.contains(uuid) {
            Admission::AlreadyAcknowledged
        } else if self.received.contains(uuid) {
            Admission::Duplicate
        } else {
            Admission::New
        }
    }

    /// Record a new update at the tail of the queue.
    pub fn apply_update(&mut self, update: StatusUpdate) {
        self.received.insert(update.uuid);
        self.pending.push_back(update);
    }

    /// Check that `uuid` may acknowledge `expected` (the current head).
    ///
    /// Returns `Ok(false)` for a benign duplicate ack, `Ok(true)` when the
    /// ack settles the head, and a protocol violation otherwise.
    pub fn check_ack(&self, uuid: &UpdateUuid, expected: Option<&StatusUpdate>) -> Result<bool> {
        if self.acknowledged.contains(uuid) {
            return Ok(false);
        }

        match expected {
            Some(head) if head.uuid == *uuid => Ok(true),
            _ => Err(CourierError::ProtocolViolation {
                expected: expected.map(|u| u.uuid),
                received: *uuid,
            }),
        }
    }

    /// Record the ack of the head and pop it.
    pub fn apply_ack(&mut self, uuid: UpdateUuid) -> Option<StatusUpdate> {
        self.acknowledged.insert(uuid);
        self.pending.pop_front()
    }

    /// Rebuild state by applying logged records in file order.
    ///
    /// An ACK that does not name the pending head means the log was not
    /// written by this protocol and is rejected as corrupt.
    pub fn replay<'a>(records: impl IntoIterator<Item = &'a CheckpointRecord>) -> Result<Self> {
        let mut state = Self::new();

        for (index, record) in records.into_iter().enumerate() {
            match record {
                CheckpointRecord::Update { update } => {
                    if state.admit(&update.uuid) == Admission::New {
                        state.apply_update(update.clone());
                    }
                }
                CheckpointRecord::Ack { uuid } => {
                    let settles_head = state.check_ack(uuid, state.head()).map_err(|e| {
                        CourierError::Parse(format!("Out-of-order ACK at record {index}: {e}"))
                    })?;
                    if settles_head {
                        state.apply_ack(*uuid);
                    }
                }
            }
        }

        Ok(state)
    }

    /// Oldest unacknowledged update.
    pub fn head(&self) -> Option<&StatusUpdate> {
        self.pending.front()
    }

    pub fn pending(&self) -> &VecDeque<StatusUpdate> {
        &self.pending
    }

    pub fn received(&self) -> &HashSet<UpdateUuid> {
        &self.received
    }

    pub fn acknowledged(&self) -> &HashSet<UpdateUuid> {
        &self.acknowledged
    }
}
