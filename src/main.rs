//! courier CLI - Reliable delivery of task status updates.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use courier::checkpoint::{CheckpointLog, discover_logs};
use courier::models::CheckpointConfig;
use courier::{
    ChannelTransport, Config, DeliveryState, FrameworkId, FsLogStorage, StatusUpdate, TaskId,
    TaskState, TaskStatus, UpdateManager, UpdateUuid,
};
use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{Level, info, warn};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "courier")]
#[command(version)]
#[command(about = "Reliable, checkpointed delivery of task status updates")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(short, long, global = true, default_value = "courier.toml")]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the state recovered from a task's update log
    Replay {
        /// Path to a task.updates file
        log: PathBuf,
    },

    /// Drive an update manager from a JSONL file of events
    Relay {
        /// Path to the events JSONL file
        #[arg(short, long)]
        events: PathBuf,

        /// Recover streams from update logs under the meta directory first
        #[arg(long)]
        recover: bool,
    },

    /// Validate configuration file
    Validate,

    /// Show example configuration
    Example,
}

/// One line of a relay events file.
#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum RelayEvent {
    Update {
        framework_id: FrameworkId,
        task_id: TaskId,
        state: TaskState,
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        uuid: Option<UpdateUuid>,
    },
    Ack {
        framework_id: FrameworkId,
        task_id: TaskId,
        uuid: UpdateUuid,
    },
    Cleanup {
        framework_id: FrameworkId,
    },
    Master {
        address: String,
    },
}

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set subscriber");
}

fn print_example_config() {
    let example = r#"# courier configuration file

[manager]
# Fixed interval between resends of an unacknowledged update
retry_interval_ms = 10000
# Resend every pending update as soon as a new coordinator is detected
flush_on_new_master = false

[coordinator]
# Destination used until a new coordinator is detected
# address = "coordinator@10.0.0.1:5050"

[checkpoint]
enabled = true
meta_dir = "/var/lib/courier/meta"
"#;
    println!("{example}");
}

fn load_config(path: &Path) -> Result<Config> {
    Config::from_file(path).with_context(|| format!("Failed to load config from {path:?}"))
}

fn replay(log: &Path) -> Result<()> {
    let decoded = CheckpointLog::read(&FsLogStorage, log)
        .with_context(|| format!("Failed to read update log {log:?}"))?;
    let state = DeliveryState::replay(&decoded.records)
        .with_context(|| format!("Failed to replay update log {log:?}"))?;

    println!("\n=== Update Log ===");
    println!("Records:      {}", decoded.records.len());
    println!("Valid bytes:  {}", decoded.valid_len);
    println!("Partial tail: {}", decoded.truncated_tail);
    println!("Received:     {}", state.received().len());
    println!("Acknowledged: {}", state.acknowledged().len());
    println!("Pending:      {}", state.pending().len());
    for update in state.pending() {
        println!("  {update}");
    }
    Ok(())
}

async fn relay(config: Config, events: &Path, recover: bool) -> Result<()> {
    let (transport, mut outbound) = ChannelTransport::new();
    let (manager, process) = UpdateManager::spawn(&config, Arc::new(transport))
        .context("Failed to start update manager")?;

    let printer = tokio::spawn(async move {
        let mut sent = 0usize;
        while let Some(out) = outbound.recv().await {
            sent += 1;
            println!("-> {}: {}", out.coordinator, out.update);
        }
        sent
    });

    if recover {
        for log in discover_logs(&config.checkpoint.meta_dir)? {
            manager
                .recover(log.task_id.clone(), log.framework_id.clone(), log.path.clone())
                .await
                .with_context(|| format!("Failed to recover {:?}", log.path))?;
        }
    }

    let file = File::open(events).with_context(|| format!("Failed to open {events:?}"))?;
    for (line_num, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read {events:?}"))?;
        if line.trim().is_empty() {
            continue;
        }
        let event: RelayEvent = serde_json::from_str(&line)
            .with_context(|| format!("Line {}: invalid event", line_num + 1))?;

        let outcome = match event {
            RelayEvent::Update {
                framework_id,
                task_id,
                state,
                message,
                uuid,
            } => {
                let mut status = TaskStatus::new(task_id.clone(), state);
                if let Some(message) = message {
                    status = status.with_message(message);
                }
                let mut update = StatusUpdate::new(framework_id.clone(), status);
                if let Some(uuid) = uuid {
                    update.uuid = uuid;
                }
                println!("<- update {update}");
                match config.checkpoint.path_for(&framework_id, &task_id) {
                    Ok(path) => {
                        manager
                            .update(update, config.checkpoint.enabled, path)
                            .await
                    }
                    Err(e) => Err(e.into()),
                }
            }
            RelayEvent::Ack {
                framework_id,
                task_id,
                uuid,
            } => {
                println!("<- ack {uuid} for task {task_id} of framework {framework_id}");
                manager.acknowledgement(task_id, framework_id, uuid).await
            }
            RelayEvent::Cleanup { framework_id } => manager.cleanup(framework_id).await,
            RelayEvent::Master { address } => manager.new_master_detected(address),
        };

        match outcome {
            Ok(()) => {}
            Err(e) if e.is_fatal() => bail!("Line {}: {e}", line_num + 1),
            Err(e) => warn!(line = line_num + 1, error = %e, "Event failed"),
        }
    }

    manager.shutdown().await?;
    process.await.context("Update manager task failed")?;
    let sent = printer.await.context("Outbound printer task failed")?;

    println!("\n=== Relay Complete ===");
    println!("Sent:        {sent}");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match cli.command {
        Commands::Example => print_example_config(),

        Commands::Validate => {
            let config = load_config(&cli.config)?;
            info!("Configuration is valid");
            info!(
                "  Retry interval: {}ms (flush on new coordinator: {})",
                config.manager.retry_interval_ms, config.manager.flush_on_new_master
            );
            info!(
                "  Coordinator: {}",
                config.coordinator.address.as_deref().unwrap_or("<none>")
            );
            if config.checkpoint.enabled {
                info!(
                    "  Checkpoints: {:?}",
                    CheckpointConfig::task_updates_path(
                        &config.checkpoint.meta_dir,
                        &FrameworkId::new("<framework>"),
                        &TaskId::new("<task>"),
                    )?
                );
            } else {
                info!("  Checkpoints: disabled");
            }
        }

        Commands::Replay { log } => replay(&log)?,

        Commands::Relay { events, recover } => {
            let config = if cli.config.exists() {
                load_config(&cli.config)?
            } else {
                warn!(path = ?cli.config, "Config file not found, using defaults");
                Config::default()
            };
            relay(config, &events, recover).await?;
        }
    }

    Ok(())
}
