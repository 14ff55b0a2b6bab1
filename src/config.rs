use anyhow::{Context, Result};
use std::path::PathBuf;

use crate::loopsmith_config::{LoopsmithConfig, LoopsmithToml};

/// Runtime configuration for loopsmith.
///
/// Resolves every path under `.loopsmith/` once and carries the parsed
/// `loopsmith.toml` alongside the CLI flags.
#[derive(Debug, Clone)]
pub struct Config {
    pub project_dir: PathBuf,
    pub loopsmith_dir: PathBuf,
    pub state_file: PathBuf,
    pub stop_file: PathBuf,
    pub lock_file: PathBuf,
    pub inbox_file: PathBuf,
    pub audit_dir: PathBuf,
    pub log_dir: PathBuf,
    pub worker_cmd: String,
    pub verbose: bool,
    loopsmith_config: LoopsmithConfig,
}

impl Config {
    pub fn new(project_dir: PathBuf, verbose: bool) -> Result<Self> {
        let loopsmith_config = LoopsmithConfig::new(project_dir)?.with_verbose(verbose);
        let project_dir = loopsmith_config.project_dir.clone();
        let loopsmith_dir = loopsmith_config.loopsmith_dir.clone();

        Ok(Self {
            state_file: loopsmith_dir.join("state.json"),
            stop_file: loopsmith_dir.join("stop"),
            lock_file: loopsmith_dir.join("run.lock"),
            inbox_file: loopsmith_dir.join("inbox.jsonl"),
            audit_dir: loopsmith_dir.join("audit"),
            log_dir: loopsmith_dir.join("logs"),
            worker_cmd: loopsmith_config.toml.worker_command(),
            project_dir,
            loopsmith_dir,
            verbose,
            loopsmith_config,
        })
    }

    pub fn loopsmith_config(&self) -> &LoopsmithConfig {
        &self.loopsmith_config
    }

    pub fn toml(&self) -> &LoopsmithToml {
        &self.loopsmith_config.toml
    }

    pub fn tasks_dir(&self) -> PathBuf {
        self.audit_dir.join("tasks")
    }

    pub fn dispatch_log(&self) -> PathBuf {
        self.audit_dir.join("dispatch.jsonl")
    }

    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.audit_dir).context("Failed to create audit directory")?;
        std::fs::create_dir_all(&self.log_dir).context("Failed to create log directory")?;
        std::fs::create_dir_all(self.tasks_dir())
            .context("Failed to create task archive directory")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_paths_live_under_loopsmith_dir() {
        let dir = tempdir().unwrap();
        let config = Config::new(dir.path().to_path_buf(), false).unwrap();
        let root = dir.path().canonicalize().unwrap().join(".loopsmith");
        assert_eq!(config.state_file, root.join("state.json"));
        assert_eq!(config.stop_file, root.join("stop"));
        assert_eq!(config.lock_file, root.join("run.lock"));
        assert_eq!(config.inbox_file, root.join("inbox.jsonl"));
        assert_eq!(config.dispatch_log(), root.join("audit/dispatch.jsonl"));
    }

    #[test]
    fn test_ensure_directories() {
        let dir = tempdir().unwrap();
        let config = Config::new(dir.path().to_path_buf(), true).unwrap();
        config.ensure_directories().unwrap();
        assert!(config.audit_dir.exists());
        assert!(config.log_dir.exists());
        assert!(config.tasks_dir().exists());
        assert!(config.verbose);
    }

    #[test]
    fn test_missing_project_dir_is_an_error() {
        let dir = tempdir().unwrap();
        let result = Config::new(dir.path().join("absent"), false);
        assert!(result.is_err());
    }
}
