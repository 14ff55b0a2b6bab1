//! Typed error hierarchy for the loopsmith orchestrator.
//!
//! Four enums cover the layers of the loop:
//! - `CapabilityError`: a worker invocation failed (recoverable by retry)
//! - `TransitionError`: an event does not apply to the task's current phase
//! - `StateError`: the snapshot could not be read or written
//! - `OrchestratorError`: umbrella type returned by the tick loop

use crate::phase::Phase;
use thiserror::Error;

/// Errors reported by external worker capabilities.
///
/// These never escape the tick as process errors: the orchestrator turns them
/// into `CapabilityFailed` events that self-loop the current phase.
#[derive(Debug, Error)]
pub enum CapabilityError {
    #[error("Failed to spawn worker command '{command}': {source}")]
    SpawnFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Worker exited with non-zero code {exit_code}")]
    NonZeroExit { exit_code: i32 },

    #[error("Worker timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("Worker output did not contain a valid response: {0}")]
    MalformedResponse(String),

    #[error("{capability} failed: {message}")]
    Failed { capability: String, message: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CapabilityError {
    pub fn failed(capability: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failed {
            capability: capability.into(),
            message: message.into(),
        }
    }
}

/// Errors from the phase state machine.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Task is in terminal phase {phase} and cannot advance")]
    Terminal { phase: Phase },

    #[error("Event '{event}' is not valid in phase {phase}")]
    UnexpectedEvent { phase: Phase, event: String },

    #[error("Illegal transition {from} -> {to}")]
    IllegalTransition { from: Phase, to: Phase },
}

/// Errors from snapshot persistence.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("Failed to write snapshot at {path}: {source}")]
    WriteFailed {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read snapshot at {path}: {source}")]
    ReadFailed {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Snapshot at {path} is corrupted (backed up to {backup}): {message}")]
    Corrupted {
        path: std::path::PathBuf,
        backup: std::path::PathBuf,
        message: String,
    },

    #[error("Failed to serialize snapshot: {0}")]
    Serialize(#[source] serde_json::Error),
}

/// Errors from the orchestrator tick loop.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("Another loopsmith instance holds the run lock at {path}")]
    LockHeld { path: std::path::PathBuf },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Process exit codes.
pub mod exit_codes {
    /// Graceful pause, abort or completion.
    pub const SUCCESS: i32 = 0;

    /// Unrecoverable error, including a failed snapshot write.
    pub const FATAL: i32 = 1;

    /// The persisted state was corrupted and has been backed up.
    pub const CORRUPT_STATE: i32 = 2;
}

/// Map an error chain to the process exit code.
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    for cause in err.chain() {
        if let Some(StateError::Corrupted { .. }) = cause.downcast_ref::<StateError>() {
            return exit_codes::CORRUPT_STATE;
        }
        if let Some(OrchestratorError::State(StateError::Corrupted { .. })) =
            cause.downcast_ref::<OrchestratorError>()
        {
            return exit_codes::CORRUPT_STATE;
        }
    }
    exit_codes::FATAL
}
