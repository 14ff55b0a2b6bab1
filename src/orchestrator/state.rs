use crate::backlog::Backlog;
use crate::breakers::CircuitBreakerState;
use crate::coverage::CoverageReport;
use crate::dispatch::RateWindow;
use crate::errors::{OrchestratorError, StateError};
use crate::task::Task;
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Snapshot format version.
pub const STATE_VERSION: u32 = 1;

/// Counters accumulated across every run of a project.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub ticks: u64,
    pub completed: u32,
    pub blocked: u32,
    /// Backlog items added by discovery and the coverage gate.
    pub discovered: u32,
}

/// Everything the loop needs to resume, persisted as one JSON document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorState {
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_task: Option<Task>,
    #[serde(default)]
    pub backlog: Backlog,
    #[serde(default)]
    pub breakers: CircuitBreakerState,
    #[serde(default)]
    pub rate_window: RateWindow,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_coverage: Option<CoverageReport>,
    #[serde(default)]
    pub stats: RunStats,
    #[serde(default)]
    pub discovery_generation: u64,
    pub updated_at: DateTime<Utc>,
}

impl Default for OrchestratorState {
    fn default() -> Self {
        Self::new()
    }
}

impl OrchestratorState {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            version: STATE_VERSION,
            active_task: None,
            backlog: Backlog::new(),
            breakers: CircuitBreakerState::new(now),
            rate_window: RateWindow::default(),
            last_coverage: None,
            stats: RunStats::default(),
            discovery_generation: 0,
            updated_at: now,
        }
    }
}

/// Result of reading the snapshot file.
#[derive(Debug)]
pub enum LoadOutcome {
    /// No snapshot yet.
    Fresh(OrchestratorState),
    Loaded(OrchestratorState),
    /// The file did not parse; it was copied to `backup`.
    Corrupt { backup: PathBuf, message: String },
}

/// Reads and writes `.loopsmith/state.json`.
pub struct StateStore {
    state_file: PathBuf,
}

impl StateStore {
    pub fn new(state_file: impl Into<PathBuf>) -> Self {
        Self {
            state_file: state_file.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.state_file
    }

    /// Read the snapshot. A file that fails to parse is backed up to
    /// `state.json.corrupt-<timestamp>` and left in place.
    pub fn load(&self) -> Result<LoadOutcome, StateError> {
        if !self.state_file.exists() {
            return Ok(LoadOutcome::Fresh(OrchestratorState::new()));
        }

        let content =
            fs::read_to_string(&self.state_file).map_err(|source| StateError::ReadFailed {
                path: self.state_file.clone(),
                source,
            })?;

        match serde_json::from_str::<OrchestratorState>(&content) {
            Ok(state) => Ok(LoadOutcome::Loaded(state)),
            Err(e) => {
                let backup = self.backup_path();
                fs::copy(&self.state_file, &backup).map_err(|source| {
                    StateError::WriteFailed {
                        path: backup.clone(),
                        source,
                    }
                })?;
                tracing::error!(
                    path = %self.state_file.display(),
                    backup = %backup.display(),
                    error = %e,
                    "snapshot is corrupted"
                );
                Ok(LoadOutcome::Corrupt {
                    backup,
                    message: e.to_string(),
                })
            }
        }
    }

    /// Load for resumption. A corrupt snapshot is replaced with a fresh one
    /// and reported as [`StateError::Corrupted`] so the process can exit
    /// with a distinct code; the next load starts fresh.
    pub fn load_or_recover(&self) -> Result<OrchestratorState, StateError> {
        match self.load()? {
            LoadOutcome::Fresh(state) | LoadOutcome::Loaded(state) => Ok(state),
            LoadOutcome::Corrupt { backup, message } => {
                self.save(&mut OrchestratorState::new())?;
                Err(StateError::Corrupted {
                    path: self.state_file.clone(),
                    backup,
                    message,
                })
            }
        }
    }

    /// Write the snapshot through a temporary file and rename.
    pub fn save(&self, state: &mut OrchestratorState) -> Result<(), StateError> {
        state.updated_at = Utc::now();
        let json = serde_json::to_string_pretty(state).map_err(StateError::Serialize)?;

        if let Some(parent) = self.state_file.parent() {
            fs::create_dir_all(parent).map_err(|source| StateError::WriteFailed {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let tmp = self.state_file.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|source| StateError::WriteFailed {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &self.state_file).map_err(|source| StateError::WriteFailed {
            path: self.state_file.clone(),
            source,
        })
    }

    fn backup_path(&self) -> PathBuf {
        let name = self
            .state_file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "state.json".to_string());
        self.state_file.with_file_name(format!(
            "{}.corrupt-{}",
            name,
            Utc::now().format("%Y%m%dT%H%M%S%.3fZ")
        ))
    }
}

/// Exclusive lock held for the duration of a run. Released on drop.
#[derive(Debug)]
pub struct RunLock {
    _file: fs::File,
}

impl RunLock {
    pub fn acquire(path: &Path) -> Result<Self, OrchestratorError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| OrchestratorError::Other(e.into()))?;
        }
        let file = fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .map_err(|e| OrchestratorError::Other(e.into()))?;
        file.try_lock_exclusive()
            .map_err(|_| OrchestratorError::LockHeld {
                path: path.to_path_buf(),
            })?;
        Ok(Self { _file: file })
    }
}
