//! Storage capability used by checkpoint logs.
//!
//! Every call returns a `Result` instead of panicking, so a disk fault turns
//! into a latched stream error rather than a crash.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

/// An open, append-only log file. Dropping it closes the file.
pub trait LogFile: Send {
    /// Append `bytes` and make them durable before returning.
    fn append(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Flush file data and metadata ahead of closing.
    fn sync(&mut self) -> io::Result<()>;
}

/// Filesystem operations a checkpoint log needs.
pub trait LogStorage: Send + Sync {
    /// Recursively create `dir`; succeeds if it already exists.
    fn create_dir_all(&self, dir: &Path) -> io::Result<()>;

    /// Open `path` for appending, creating it if absent.
    fn open_append(&self, path: &Path) -> io::Result<Box<dyn LogFile>>;

    /// Read the whole file, or `None` if it does not exist.
    fn read(&self, path: &Path) -> io::Result<Option<Vec<u8>>>;

    /// Cut the file down to `len` bytes.
    fn truncate(&self, path: &Path, len: u64) -> io::Result<()>;
}

/// Local filesystem storage.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsLogStorage;

struct FsLogFile {
    file: File,
}

impl LogFile for FsLogFile {
    fn append(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.file.write_all(bytes)?;
        self.file.sync_data()
    }

    fn sync(&mut self) -> io::Result<()> {
        self.file.sync_all()
    }
}

impl LogStorage for FsLogStorage {
    fn create_dir_all(&self, dir: &Path) -> io::Result<()> {
        fs::create_dir_all(dir)
    }

    fn open_append(&self, path: &Path) -> io::Result<Box<dyn LogFile>> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;
        Ok(Box::new(FsLogFile { file }))
    }

    fn read(&self, path: &Path) -> io::Result<Option<Vec<u8>>> {
        match fs::read(path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn truncate(&self, path: &Path, len: u64) -> io::Result<()> {
        let file = OpenOptions::new().write(true).open(path)?;
        file.set_len(len)?;
        file.sync_all()
    }
}
