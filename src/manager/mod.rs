//! Status update manager.
//!
//! Responsible for:
//! 1) Reliably sending status updates to the coordinator
//! 2) Checkpointing updates and acknowledgements (optional)
//! 3) Resending the oldest unacknowledged update until it is acknowledged
//!
//! `UpdateManager` is a cheap, cloneable handle. All work happens in one
//! spawned process task that drains the handle's command channel.

mod process;
mod retry;
mod transport;

pub use retry::*;
pub use transport::*;

use crate::checkpoint::{FsLogStorage, LogStorage};
use crate::models::{
    Config, CourierError, FrameworkId, Result, StatusUpdate, StreamKey, TaskId, UpdateUuid,
};
use process::{Command, ManagerProcess};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Read-only view of one stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSnapshot {
    pub key: StreamKey,
    /// Pending uuids, oldest first
    pub pending: Vec<UpdateUuid>,
    pub received: HashSet<UpdateUuid>,
    pub acknowledged: HashSet<UpdateUuid>,
    /// Latched terminal error
    pub error: Option<String>,
    pub retry_armed: bool,
    /// When the pending head is next resent
    pub retry_deadline: Option<Instant>,
    pub checkpointed: bool,
}

/// Handle to a running status update manager.
#[derive(Clone)]
pub struct UpdateManager {
    commands: mpsc::UnboundedSender<Command>,
}

impl UpdateManager {
    /// Spawn a manager writing checkpoints to the local filesystem.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(config: &Config, transport: Arc<dyn Transport>) -> Result<(Self, JoinHandle<()>)> {
        Self::spawn_with_storage(config, transport, Arc::new(FsLogStorage))
    }

    /// Spawn a manager writing checkpoints through `storage`.
    ///
    /// Fails with [`CourierError::Config`] if `config` does not validate.
    pub fn spawn_with_storage(
        config: &Config,
        transport: Arc<dyn Transport>,
        storage: Arc<dyn LogStorage>,
    ) -> Result<(Self, JoinHandle<()>)> {
        config.validate()?;

        let (tx, rx) = mpsc::unbounded_channel();
        let process = ManagerProcess::new(
            rx,
            tx.downgrade(),
            transport,
            storage,
            config.coordinator.address.clone(),
            config.manager.retry_interval(),
            config.manager.flush_on_new_master,
        );
        let handle = tokio::spawn(process.run());
        Ok((Self { commands: tx }, handle))
    }

    /// Enqueue a status update for reliable delivery.
    ///
    /// If `checkpoint` is set the update is durably logged to `path` before
    /// it is accepted. Duplicates resolve successfully without any effect.
    pub async fn update(
        &self,
        update: StatusUpdate,
        checkpoint: bool,
        path: Option<PathBuf>,
    ) -> Result<()> {
        self.call(|reply| Command::Update {
            update,
            checkpoint,
            path,
            reply,
        })
        .await?
    }

    /// Process the coordinator's acknowledgement of `uuid` and send the next
    /// pending update, if any.
    ///
    /// An acknowledgement that is not for the oldest pending update returns
    /// [`CourierError::ProtocolViolation`].
    pub async fn acknowledgement(
        &self,
        task_id: TaskId,
        framework_id: FrameworkId,
        uuid: UpdateUuid,
    ) -> Result<()> {
        self.call(|reply| Command::Acknowledgement {
            task_id,
            framework_id,
            uuid,
            reply,
        })
        .await?
    }

    /// Close every stream of a framework, abandoning its pending updates.
    pub async fn cleanup(&self, framework_id: FrameworkId) -> Result<()> {
        self.call(|reply| Command::Cleanup {
            framework_id,
            reply,
        })
        .await
    }

    /// Send all future updates to `address`.
    pub fn new_master_detected(&self, address: impl Into<String>) -> Result<()> {
        self.commands
            .send(Command::NewMasterDetected {
                address: address.into(),
            })
            .map_err(|_| CourierError::ChannelClosed)
    }

    /// Rebuild a stream from its update log after a restart and resume
    /// sending its pending head.
    pub async fn recover(
        &self,
        task_id: TaskId,
        framework_id: FrameworkId,
        path: PathBuf,
    ) -> Result<()> {
        self.call(|reply| Command::Recover {
            task_id,
            framework_id,
            path,
            reply,
        })
        .await?
    }

    /// Inspect a stream.
    pub async fn stream(&self, key: StreamKey) -> Result<Option<StreamSnapshot>> {
        self.call(|reply| Command::Snapshot { key, reply }).await
    }

    /// Stop the manager, cancelling every timer and closing every log.
    pub async fn shutdown(&self) -> Result<()> {
        self.call(|reply| Command::Shutdown { reply }).await
    }

    async fn call<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(make(reply))
            .map_err(|_| CourierError::ChannelClosed)?;
        response.await.map_err(|_| CourierError::ChannelClosed)
    }
}
