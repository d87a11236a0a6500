//! Discovery of update logs left behind by a previous agent run.

use crate::models::{CourierError, FrameworkId, Result, TASK_UPDATES_FILE, TaskId};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// An update log found under the meta directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredLog {
    pub framework_id: FrameworkId,
    pub task_id: TaskId,
    pub path: PathBuf,
}

/// Find every `<meta>/frameworks/<fw>/tasks/<task>/task.updates` file.
pub fn discover_logs(meta_dir: &Path) -> Result<Vec<DiscoveredLog>> {
    let pattern = meta_dir
        .join("frameworks")
        .join("*")
        .join("tasks")
        .join("*")
        .join(TASK_UPDATES_FILE);
    let pattern_str = pattern.to_string_lossy();

    let paths = glob::glob(&pattern_str)
        .map_err(|e| CourierError::Internal(format!("Invalid glob pattern: {e}")))?;

    let mut logs = Vec::new();
    for entry in paths {
        let path = match entry {
            Ok(path) => path,
            Err(e) => {
                warn!(error = %e, "Skipping unreadable update log entry");
                continue;
            }
        };

        // <fw>/tasks/<task>/task.updates
        let task_dir = path.parent();
        let task_id = task_dir.and_then(Path::file_name);
        let framework_id = task_dir
            .and_then(Path::parent)
            .and_then(Path::parent)
            .and_then(Path::file_name);

        match (framework_id, task_id) {
            (Some(fw), Some(task)) => logs.push(DiscoveredLog {
                framework_id: FrameworkId::new(fw.to_string_lossy()),
                task_id: TaskId::new(task.to_string_lossy()),
                path,
            }),
            _ => warn!(path = %path.display(), "Update log outside the expected layout"),
        }
    }

    logs.sort_by(|a, b| a.path.cmp(&b.path));
    debug!(count = logs.len(), "Discovered status update logs");
    Ok(logs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CheckpointConfig;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_discovers_logs_in_layout() {
        let temp_dir = TempDir::new().unwrap();
        let meta = temp_dir.path();

        for (fw, task) in [("f1", "t1"), ("f1", "t2"), ("f2", "t9")] {
            let path = CheckpointConfig::task_updates_path(
                meta,
                &FrameworkId::new(fw),
                &TaskId::new(task),
            )
            .unwrap();
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, b"").unwrap();
        }
        // Not an update log.
        fs::write(meta.join("frameworks/f1/tasks/t1/other"), b"").unwrap();

        let logs = discover_logs(meta).unwrap();
        let keys: Vec<_> = logs
            .iter()
            .map(|l| (l.framework_id.as_str(), l.task_id.as_str()))
            .collect();
        assert_eq!(keys, vec![("f1", "t1"), ("f1", "t2"), ("f2", "t9")]);
    }

    #[test]
    fn test_empty_meta_dir() {
        let temp_dir = TempDir::new().unwrap();
        assert!(discover_logs(temp_dir.path()).unwrap().is_empty());
    }
}
