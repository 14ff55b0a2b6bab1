use crate::capabilities::CommitRef;
use crate::discovery::Finding;
use crate::dispatch::Capability;
use crate::phase::Phase;
use crate::task::Task;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a task left the lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum TaskOutcome {
    Complete,
    Blocked { reason: String },
}

/// A terminal task written to `audit/tasks/<task-id>.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskArchive {
    pub task: Task,
    pub outcome: TaskOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<CommitRef>,
    /// Research gathered about a block reason.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub investigation: Vec<Finding>,
    pub archived_at: DateTime<Utc>,
}

impl TaskArchive {
    pub fn new(task: Task) -> Self {
        let outcome = match task.block_reason() {
            Some(reason) => TaskOutcome::Blocked {
                reason: reason.to_string(),
            },
            None => TaskOutcome::Complete,
        };
        Self {
            task,
            outcome,
            commit: None,
            investigation: Vec::new(),
            archived_at: Utc::now(),
        }
    }

    /// Wall-clock seconds from task creation to archival.
    pub fn duration_secs(&self) -> i64 {
        (self.archived_at - self.task.created_at).num_seconds()
    }
}

/// Whether a delegation went out or was held back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchDecision {
    Dispatched,
    Throttled,
}

/// One line of `audit/dispatch.jsonl`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchRecord {
    pub at: DateTime<Utc>,
    pub task_id: String,
    pub phase: Phase,
    pub capability: Capability,
    pub objective: String,
    pub decision: DispatchDecision,
}

pub mod logger;
pub use logger::AuditLogger;
