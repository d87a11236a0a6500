//! The manager's single serialization context.
//!
//! Epistemic foundation:
//! - K_i: One task drains one command channel; every operation and every
//!   timer firing runs here, one at a time, so streams need no locks
//! - K_i: Only the pending head is ever in flight to the coordinator
//! - I^B: The coordinator may never answer → resend on a fixed interval

use super::retry::RetryScheduler;
use super::transport::Transport;
use super::StreamSnapshot;
use crate::checkpoint::LogStorage;
use crate::models::{
    CourierError, FrameworkId, Result, StatusUpdate, StreamKey, TaskId, UpdateUuid,
};
use crate::stream::UpdateStream;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// Operations posted to the manager process.
pub(crate) enum Command {
    Update {
        update: StatusUpdate,
        checkpoint: bool,
        path: Option<PathBuf>,
        reply: oneshot::Sender<Result<()>>,
    },
    Acknowledgement {
        task_id: TaskId,
        framework_id: FrameworkId,
        uuid: UpdateUuid,
        reply: oneshot::Sender<Result<()>>,
    },
    Cleanup {
        framework_id: FrameworkId,
        reply: oneshot::Sender<()>,
    },
    NewMasterDetected {
        address: String,
    },
    Recover {
        task_id: TaskId,
        framework_id: FrameworkId,
        path: PathBuf,
        reply: oneshot::Sender<Result<()>>,
    },
    Snapshot {
        key: StreamKey,
        reply: oneshot::Sender<Option<StreamSnapshot>>,
    },
    Timeout {
        key: StreamKey,
        seq: u64,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

struct StreamEntry {
    stream: UpdateStream,
    retry: RetryScheduler,
}

/// Where and how often updates go out.
struct Outlet {
    transport: Arc<dyn Transport>,
    master: Option<String>,
    retry_interval: Duration,
    /// Weak, so pending timers do not keep the process alive.
    commands: mpsc::WeakUnboundedSender<Command>,
}

impl Outlet {
    fn forward(&self, update: &StatusUpdate) {
        let Some(master) = self.master.as_deref() else {
            warn!(update = %update, "No coordinator known yet, deferring status update");
            return;
        };

        debug!(update = %update, coordinator = master, "Forwarding status update");
        if let Err(e) = self.transport.send(master, update) {
            warn!(update = %update, error = %e, "Failed to forward status update");
        }
    }

    /// Send the head of `entry` (if any) and arm its resend timer.
    fn dispatch(&self, key: &StreamKey, entry: &mut StreamEntry) {
        let Some(head) = entry.stream.next() else {
            entry.retry.cancel();
            return;
        };
        self.forward(head);

        let commands = self.commands.clone();
        let key = key.clone();
        entry.retry.arm(self.retry_interval, move |seq| {
            if let Some(commands) = commands.upgrade() {
                let _ = commands.send(Command::Timeout { key, seq });
            }
        });
    }
}

pub(crate) struct ManagerProcess {
    streams: HashMap<StreamKey, StreamEntry>,
    storage: Arc<dyn LogStorage>,
    outlet: Outlet,
    flush_on_new_master: bool,
    commands: mpsc::UnboundedReceiver<Command>,
}

impl ManagerProcess {
    pub(crate) fn new(
        commands: mpsc::UnboundedReceiver<Command>,
        weak_sender: mpsc::WeakUnboundedSender<Command>,
        transport: Arc<dyn Transport>,
        storage: Arc<dyn LogStorage>,
        master: Option<String>,
        retry_interval: Duration,
        flush_on_new_master: bool,
    ) -> Self {
        Self {
            streams: HashMap::new(),
            storage,
            outlet: Outlet {
                transport,
                master,
                retry_interval,
                commands: weak_sender,
            },
            flush_on_new_master,
            commands,
        }
    }

    /// Process commands until shutdown or until every handle is dropped.
    pub(crate) async fn run(mut self) {
        info!(
            retry_interval_ms = self.outlet.retry_interval.as_millis() as u64,
            "Status update manager started"
        );

        while let Some(command) = self.commands.recv().await {
            match command {
                Command::Update {
                    update,
                    checkpoint,
                    path,
                    reply,
                } => {
                    let _ = reply.send(self.update(update, checkpoint, path));
                }
                Command::Acknowledgement {
                    task_id,
                    framework_id,
                    uuid,
                    reply,
                } => {
                    let _ = reply.send(self.acknowledgement(task_id, framework_id, uuid));
                }
                Command::Cleanup {
                    framework_id,
                    reply,
                } => {
                    self.cleanup(&framework_id);
                    let _ = reply.send(());
                }
                Command::NewMasterDetected { address } => self.new_master_detected(address),
                Command::Recover {
                    task_id,
                    framework_id,
                    path,
                    reply,
                } => {
                    let _ = reply.send(self.recover(task_id, framework_id, path));
                }
                Command::Snapshot { key, reply } => {
                    let _ = reply.send(self.snapshot(&key));
                }
                Command::Timeout { key, seq } => self.timeout(&key, seq),
                Command::Shutdown { reply } => {
                    self.shutdown();
                    let _ = reply.send(());
                    return;
                }
            }
        }

        self.shutdown();
    }

    fn update(
        &mut self,
        update: StatusUpdate,
        checkpoint: bool,
        path: Option<PathBuf>,
    ) -> Result<()> {
        let key = update.key();

        if !self.streams.contains_key(&key) {
            let path = match (checkpoint, path) {
                (true, Some(path)) => Some(path),
                (true, None) => {
                    return Err(CourierError::Internal(format!(
                        "Checkpointing requested for {key} without a path"
                    )));
                }
                (false, _) => None,
            };

            info!(stream = %key, checkpoint, "Creating status update stream");
            let stream = UpdateStream::new(key.clone(), path, self.storage.as_ref());
            self.streams.insert(
                key.clone(),
                StreamEntry {
                    stream,
                    retry: RetryScheduler::new(),
                },
            );
        }

        let Some(entry) = self.streams.get_mut(&key) else {
            return Err(CourierError::Internal(format!("Stream for {key} vanished")));
        };

        info!(
            update = %update,
            terminal = update.status.state.is_terminal(),
            "Received status update"
        );
        let accepted = entry.stream.update(update)?;

        // Only the head is ever in flight; while a timer is armed the new
        // update waits behind it.
        if accepted && !entry.retry.is_armed() {
            self.outlet.dispatch(&key, entry);
        }

        Ok(())
    }

    fn acknowledgement(
        &mut self,
        task_id: TaskId,
        framework_id: FrameworkId,
        uuid: UpdateUuid,
    ) -> Result<()> {
        let key = StreamKey::new(task_id, framework_id);
        let Some(entry) = self.streams.get_mut(&key) else {
            warn!(stream = %key, uuid = %uuid, "Acknowledgement for unknown stream");
            return Err(CourierError::StreamNotFound {
                task_id: key.task_id.to_string(),
                framework_id: key.framework_id.to_string(),
            });
        };

        info!(stream = %key, uuid = %uuid, "Received status update acknowledgement");

        let expected = entry.stream.next().cloned();
        let settled = match entry.stream.acknowledgement(&uuid, expected.as_ref()) {
            Ok(settled) => settled,
            Err(e) if e.is_fatal() => {
                error!(stream = %key, error = %e, "Status update protocol violated");
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        if settled {
            entry.retry.cancel();
            self.outlet.dispatch(&key, entry);
        }

        Ok(())
    }

    fn cleanup(&mut self, framework_id: &FrameworkId) {
        info!(framework_id = %framework_id, "Closing status update streams of framework");

        // Dropping an entry cancels its timer and closes its log.
        self.streams.retain(|key, entry| {
            if key.framework_id != *framework_id {
                return true;
            }
            let pending = entry.stream.state().pending().len();
            if pending > 0 {
                warn!(stream = %key, pending, "Abandoning unacknowledged status updates");
            }
            false
        });
    }

    fn new_master_detected(&mut self, address: String) {
        info!(coordinator = %address, "New coordinator detected");
        self.outlet.master = Some(address);

        if self.flush_on_new_master {
            for (key, entry) in self.streams.iter_mut() {
                if entry.stream.next().is_some() {
                    self.outlet.dispatch(key, entry);
                }
            }
        }
    }

    fn recover(&mut self, task_id: TaskId, framework_id: FrameworkId, path: PathBuf) -> Result<()> {
        let key = StreamKey::new(task_id, framework_id);
        if self.streams.contains_key(&key) {
            return Err(CourierError::StreamExists {
                task_id: key.task_id.to_string(),
                framework_id: key.framework_id.to_string(),
            });
        }

        let stream = UpdateStream::recover(key.clone(), &path, self.storage.as_ref())?;
        let entry = self.streams.entry(key.clone()).or_insert(StreamEntry {
            stream,
            retry: RetryScheduler::new(),
        });
        self.outlet.dispatch(&key, entry);
        Ok(())
    }

    fn snapshot(&self, key: &StreamKey) -> Option<StreamSnapshot> {
        self.streams.get(key).map(|entry| {
            let state = entry.stream.state();
            StreamSnapshot {
                key: key.clone(),
                pending: state.pending().iter().map(|u| u.uuid).collect(),
                received: state.received().clone(),
                acknowledged: state.acknowledged().clone(),
                error: entry.stream.error().map(str::to_string),
                retry_armed: entry.retry.is_armed(),
                retry_deadline: entry.retry.deadline(),
                checkpointed: entry.stream.is_checkpointed(),
            }
        })
    }

    fn timeout(&mut self, key: &StreamKey, seq: u64) {
        let Some(entry) = self.streams.get_mut(key) else {
            return;
        };
        if !entry.retry.fired(seq) {
            return;
        }

        if let Some(head) = entry.stream.next() {
            warn!(update = %head, "Resending status update");
        }
        self.outlet.dispatch(key, entry);
    }

    fn shutdown(&mut self) {
        info!(streams = self.streams.len(), "Status update manager stopping");
        self.streams.clear();
    }
}
