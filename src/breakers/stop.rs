use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// External stop request backed by a sentinel file.
///
/// Raised by `loopsmith stop`, observed only at tick boundaries, and cleared
/// once the orchestrator has persisted its snapshot.
#[derive(Debug, Clone)]
pub struct StopSignal {
    path: PathBuf,
}

impl StopSignal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_raised(&self) -> bool {
        self.path.exists()
    }

    pub fn raise(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        std::fs::write(&self.path, "stop").context("Failed to create stop signal file")
    }

    /// Remove the sentinel. A missing file is not an error.
    pub fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).context("Failed to remove stop signal file"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_raise_and_clear() {
        let dir = tempdir().unwrap();
        let signal = StopSignal::new(dir.path().join(".loopsmith").join("stop"));
        assert!(!signal.is_raised());
        signal.raise().unwrap();
        assert!(signal.is_raised());
        signal.clear().unwrap();
        assert!(!signal.is_raised());
    }

    #[test]
    fn test_clear_missing_is_noop() {
        let dir = tempdir().unwrap();
        let signal = StopSignal::new(dir.path().join("stop"));
        signal.clear().unwrap();
        signal.clear().unwrap();
    }
}
