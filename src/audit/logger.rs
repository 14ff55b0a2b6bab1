use super::{DispatchRecord, TaskArchive};
use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Writes the audit trail under `.loopsmith/audit/`.
pub struct AuditLogger {
    audit_dir: PathBuf,
}

impl AuditLogger {
    pub fn new(audit_dir: &Path) -> Self {
        Self {
            audit_dir: audit_dir.to_path_buf(),
        }
    }

    fn tasks_dir(&self) -> PathBuf {
        self.audit_dir.join("tasks")
    }

    pub fn dispatch_log(&self) -> PathBuf {
        self.audit_dir.join("dispatch.jsonl")
    }

    /// Write a terminal task to `tasks/<task-id>.json`.
    pub fn archive_task(&self, archive: &TaskArchive) -> Result<PathBuf> {
        let dir = self.tasks_dir();
        fs::create_dir_all(&dir).context("Failed to create task archive directory")?;

        let path = dir.join(format!("{}.json", archive.task.id));
        let json =
            serde_json::to_string_pretty(archive).context("Failed to serialize task archive")?;
        fs::write(&path, json).context("Failed to write task archive")?;
        Ok(path)
    }

    /// Append one dispatch decision to `dispatch.jsonl`.
    pub fn log_dispatch(&self, record: &DispatchRecord) -> Result<()> {
        fs::create_dir_all(&self.audit_dir).context("Failed to create audit directory")?;
        let mut line =
            serde_json::to_string(record).context("Failed to serialize dispatch record")?;
        line.push('\n');

        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.dispatch_log())
            .context("Failed to open dispatch log")?
            .write_all(line.as_bytes())
            .context("Failed to write dispatch record")?;
        Ok(())
    }

    /// Read every dispatch record, skipping lines that do not parse.
    pub fn read_dispatches(&self) -> Result<Vec<DispatchRecord>> {
        let path = self.dispatch_log();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&path).context("Failed to read dispatch log")?;
        Ok(content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect())
    }

    /// Archived task files, most recently written first.
    pub fn list_archives(&self) -> Result<Vec<PathBuf>> {
        let dir = self.tasks_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut archives: Vec<(std::time::SystemTime, PathBuf)> = fs::read_dir(&dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().map(|e| e == "json").unwrap_or(false))
            .map(|p| {
                let modified = p
                    .metadata()
                    .and_then(|m| m.modified())
                    .unwrap_or(std::time::UNIX_EPOCH);
                (modified, p)
            })
            .collect();

        archives.sort();
        archives.reverse();
        Ok(archives.into_iter().map(|(_, p)| p).collect())
    }

    pub fn load_archive(&self, path: &Path) -> Result<TaskArchive> {
        let content = fs::read_to_string(path).context("Failed to read task archive")?;
        serde_json::from_str(&content).context("Failed to parse task archive")
    }
}
