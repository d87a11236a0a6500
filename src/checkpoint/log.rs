//! Append-only, durable update log bound to one task.
//!
//! Epistemic foundation:
//! - K_i: Every append is synced before it returns (write-ahead)
//! - K_i: The file is opened once and kept open for the stream's lifetime
//! - I^B: Crash mid-append → trailing partial record, cut off on recovery

use super::record::{CheckpointRecord, DecodedRecords, decode_all};
use super::storage::{LogFile, LogStorage};
use crate::models::{CourierError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};

/// Checkpoint log of one update stream.
pub struct CheckpointLog {
    /// File path of the update log
    path: PathBuf,
    /// Open handle, exclusively owned by this log
    file: Box<dyn LogFile>,
    /// Records appended through this handle
    appended: u64,
}

impl CheckpointLog {
    /// Create the parent directory and open the log for appending.
    pub fn open(storage: &dyn LogStorage, path: &Path) -> Result<Self> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            storage.create_dir_all(dir).map_err(|e| {
                CourierError::Setup(format!("Failed to create '{}': {e}", dir.display()))
            })?;
        }

        let file = storage.open_append(path).map_err(|e| {
            CourierError::Setup(format!(
                "Failed to open '{}' for status updates: {e}",
                path.display()
            ))
        })?;

        debug!(path = %path.display(), "Opened status update log");
        Ok(Self {
            path: path.to_path_buf(),
            file,
            appended: 0,
        })
    }

    /// Read every complete record of an existing log.
    ///
    /// A missing file reads as an empty log.
    pub fn read(storage: &dyn LogStorage, path: &Path) -> Result<DecodedRecords> {
        let bytes = storage
            .read(path)
            .map_err(|e| CourierError::io(format!("reading '{}'", path.display()), e))?;

        match bytes {
            Some(bytes) => decode_all(&bytes),
            None => Ok(DecodedRecords::default()),
        }
    }

    /// Read an existing log, cut off a partial trailing record, and reopen it
    /// for appending.
    ///
    /// A damaged record anywhere else fails with `Parse` and leaves the file
    /// untouched.
    pub fn reopen(storage: &dyn LogStorage, path: &Path) -> Result<(Self, DecodedRecords)> {
        let decoded = Self::read(storage, path)?;

        if decoded.truncated_tail {
            warn!(
                path = %path.display(),
                valid_len = decoded.valid_len,
                "Discarding partial record at the end of status update log"
            );
            storage.truncate(path, decoded.valid_len).map_err(|e| {
                CourierError::io(format!("truncating '{}'", path.display()), e)
            })?;
        }

        let log = Self::open(storage, path)?;
        Ok((log, decoded))
    }

    /// Durably append one record.
    pub fn append(&mut self, record: &CheckpointRecord) -> Result<()> {
        let frame = record.encode()?;
        self.file.append(&frame).map_err(|e| {
            CourierError::Checkpoint(format!(
                "Failed to write {} for status update {} to '{}': {e}",
                record.kind(),
                record.uuid(),
                self.path.display()
            ))
        })?;

        self.appended += 1;
        debug!(
            path = %self.path.display(),
            kind = record.kind(),
            uuid = %record.uuid(),
            "Checkpointed record"
        );
        Ok(())
    }

    /// Number of records appended since the log was opened.
    pub fn appended(&self) -> u64 {
        self.appended
    }
}

impl Drop for CheckpointLog {
    fn drop(&mut self) {
        if let Err(e) = self.file.sync() {
            error!(
                path = %self.path.display(),
                error = %e,
                "Failed to close status update log"
            );
            return;
        }
        debug!(
            path = %self.path.display(),
            appended = self.appended,
            "Closing status update log"
        );
    }
}
