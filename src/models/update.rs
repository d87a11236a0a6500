//! Status update types.
//!
//! K_i: A status update is immutable once minted; its uuid names it for the
//! whole delivery protocol (checkpoint, resend, acknowledgement).

use super::{FrameworkId, StreamKey, TaskId, UpdateUuid};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state reported by a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Staging,
    Starting,
    Running,
    Finished,
    Failed,
    Killed,
    Lost,
}

impl TaskState {
    /// Whether no further state change can follow this one.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Finished | Self::Failed | Self::Killed | Self::Lost
        )
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Staging => "TASK_STAGING",
            Self::Starting => "TASK_STARTING",
            Self::Running => "TASK_RUNNING",
            Self::Finished => "TASK_FINISHED",
            Self::Failed => "TASK_FAILED",
            Self::Killed => "TASK_KILLED",
            Self::Lost => "TASK_LOST",
        };
        f.write_str(s)
    }
}

/// Task status payload carried by an update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatus {
    pub task_id: TaskId,
    pub state: TaskState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl TaskStatus {
    pub fn new(task_id: TaskId, state: TaskState) -> Self {
        Self {
            task_id,
            state,
            message: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// One status update instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub uuid: UpdateUuid,
    pub framework_id: FrameworkId,
    pub status: TaskStatus,
    pub timestamp: DateTime<Utc>,
}

impl StatusUpdate {
    /// Mint a new update with a fresh uuid.
    pub fn new(framework_id: FrameworkId, status: TaskStatus) -> Self {
        Self {
            uuid: UpdateUuid::new_v4(),
            framework_id,
            status,
            timestamp: Utc::now(),
        }
    }

    pub fn task_id(&self) -> &TaskId {
        &self.status.task_id
    }

    pub fn key(&self) -> StreamKey {
        StreamKey::new(self.status.task_id.clone(), self.framework_id.clone())
    }
}

impl fmt::Display for StatusUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (uuid: {}) for task {} of framework {}",
            self.status.state, self.uuid, self.status.task_id, self.framework_id
        )
    }
}
