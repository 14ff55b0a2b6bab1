//! Project initialization.
//!
//! `loopsmith init` creates the `.loopsmith/` directory:
//!
//! ```text
//! .loopsmith/
//! ├── loopsmith.toml   # Configuration (defaults written on init)
//! ├── state.json       # Orchestrator snapshot (written by `run`)
//! ├── audit/
//! │   ├── tasks/       # Archived terminal tasks
//! │   └── dispatch.jsonl
//! └── logs/
//! ```

use crate::loopsmith_config::{CONFIG_FILE, LoopsmithToml};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// The name of the loopsmith directory.
pub const LOOPSMITH_DIR: &str = ".loopsmith";

/// Result of initializing a project.
#[derive(Debug)]
pub struct InitResult {
    pub loopsmith_dir: PathBuf,
    /// Whether the directory was newly created (false if it already existed)
    pub created: bool,
    /// Whether a default `loopsmith.toml` was written
    pub wrote_config: bool,
}

/// Initialize a project, completing the structure if it already exists.
/// An existing `loopsmith.toml` is never overwritten.
pub fn init_project(project_dir: &Path) -> Result<InitResult> {
    let loopsmith_dir = get_loopsmith_dir(project_dir);
    let created = !loopsmith_dir.exists();

    std::fs::create_dir_all(&loopsmith_dir)
        .with_context(|| format!("Failed to create directory: {}", loopsmith_dir.display()))?;

    for sub in ["audit", "audit/tasks", "logs"] {
        let path = loopsmith_dir.join(sub);
        std::fs::create_dir_all(&path)
            .with_context(|| format!("Failed to create directory: {}", path.display()))?;
    }

    let config_file = loopsmith_dir.join(CONFIG_FILE);
    let wrote_config = if config_file.exists() {
        false
    } else {
        LoopsmithToml::default().save(&config_file)?;
        true
    };

    Ok(InitResult {
        loopsmith_dir,
        created,
        wrote_config,
    })
}

/// Check whether the project has a `.loopsmith/` directory.
pub fn is_initialized(project_dir: &Path) -> bool {
    get_loopsmith_dir(project_dir).is_dir()
}

pub fn get_loopsmith_dir(project_dir: &Path) -> PathBuf {
    project_dir.join(LOOPSMITH_DIR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_init_project_creates_structure() {
        let dir = tempdir().unwrap();
        let result = init_project(dir.path()).unwrap();
        assert!(result.created);
        assert!(result.wrote_config);
        assert!(result.loopsmith_dir.join("audit/tasks").is_dir());
        assert!(result.loopsmith_dir.join("logs").is_dir());
        assert!(result.loopsmith_dir.join(CONFIG_FILE).is_file());
    }

    #[test]
    fn test_written_config_parses() {
        let dir = tempdir().unwrap();
        let result = init_project(dir.path()).unwrap();
        let toml = LoopsmithToml::load(&result.loopsmith_dir.join(CONFIG_FILE)).unwrap();
        assert_eq!(toml.breakers.max_iterations, 100);
    }

    #[test]
    fn test_reinit_keeps_existing_config() {
        let dir = tempdir().unwrap();
        init_project(dir.path()).unwrap();
        let config_file = get_loopsmith_dir(dir.path()).join(CONFIG_FILE);
        std::fs::write(&config_file, "[breakers]\nmax_iterations = 9\n").unwrap();

        let again = init_project(dir.path()).unwrap();
        assert!(!again.created);
        assert!(!again.wrote_config);
        let content = std::fs::read_to_string(&config_file).unwrap();
        assert!(content.contains("max_iterations = 9"));
    }

    #[test]
    fn test_is_initialized() {
        let dir = tempdir().unwrap();
        assert!(!is_initialized(dir.path()));
        init_project(dir.path()).unwrap();
        assert!(is_initialized(dir.path()));
    }
}
