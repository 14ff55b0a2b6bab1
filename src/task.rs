//! The active unit of work and the artifacts it accumulates.

use crate::backlog::BacklogItem;
use crate::coverage::CoverageReport;
use crate::phase::Phase;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

/// A specification produced by the specifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Spec {
    pub path: PathBuf,
    /// Acceptance criteria, driven one at a time by the red/green cycle.
    pub criteria: Vec<String>,
    #[serde(default)]
    pub summary: String,
}

/// Reference to a test written for one criterion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestArtifactRef {
    pub path: PathBuf,
    #[serde(default)]
    pub name: String,
}

/// Reference to the implementation written for a test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImplArtifactRef {
    pub path: PathBuf,
}

/// Artifacts accumulated by a task across its phases.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifacts {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tests: Vec<PathBuf>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub implementations: Vec<PathBuf>,
}

impl Artifacts {
    /// Every artifact path, spec first.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.spec
            .iter()
            .chain(self.tests.iter())
            .chain(self.implementations.iter())
            .cloned()
            .collect()
    }

    fn push_unique(list: &mut Vec<PathBuf>, path: PathBuf) {
        if !list.contains(&path) {
            list.push(path);
        }
    }

    pub fn add_test(&mut self, path: PathBuf) {
        Self::push_unique(&mut self.tests, path);
    }

    pub fn add_implementation(&mut self, path: PathBuf) {
        Self::push_unique(&mut self.implementations, path);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum TaskStatus {
    Active,
    Blocked { reason: String },
    Complete,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Active => write!(f, "active"),
            TaskStatus::Blocked { reason } => write!(f, "blocked: {}", reason),
            TaskStatus::Complete => write!(f, "complete"),
        }
    }
}

/// One applied phase transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: Phase,
    pub to: Phase,
    pub event: String,
    pub at: DateTime<Utc>,
}

/// A backlog item promoted into the lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub item_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub phase: Phase,
    /// Index of the acceptance criterion currently being driven.
    #[serde(default)]
    pub step: usize,
    #[serde(default)]
    pub criteria: Vec<String>,
    #[serde(default)]
    pub artifacts: Artifacts,
    pub status: TaskStatus,
    #[serde(default)]
    pub validation_retries: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_diagnostics: Option<String>,
    #[serde(default)]
    pub history: Vec<TransitionRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coverage: Option<CoverageReport>,
    pub created_at: DateTime<Utc>,
}

impl Task {
    /// Start a task for a backlog item, in the Discovery phase.
    pub fn from_item(item: &BacklogItem) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            item_id: item.id.clone(),
            title: item.title.clone(),
            description: item.description.clone(),
            phase: Phase::Discovery,
            step: 0,
            criteria: Vec::new(),
            artifacts: Artifacts::default(),
            status: TaskStatus::Active,
            validation_retries: 0,
            last_diagnostics: None,
            history: Vec::new(),
            coverage: None,
            created_at: Utc::now(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }

    /// The criterion the red/green cycle is currently driving.
    pub fn current_criterion(&self) -> Option<&str> {
        self.criteria.get(self.step).map(String::as_str)
    }

    /// Whether criteria remain after the current one.
    pub fn has_more_criteria(&self) -> bool {
        self.step + 1 < self.criteria.len()
    }

    pub fn block_reason(&self) -> Option<&str> {
        match &self.status {
            TaskStatus::Blocked { reason } => Some(reason),
            _ => None,
        }
    }

    /// Short id used in terminal output.
    pub fn short_id(&self) -> &str {
        &self.id[..8.min(self.id.len())]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backlog::{Complexity, Priority, SignalSource};

    fn sample_item() -> BacklogItem {
        BacklogItem::new(
            "Add login",
            "Users need to log in",
            Priority::High,
            Complexity::Medium,
            SignalSource::Manual,
        )
    }

    #[test]
    fn test_task_from_item_starts_in_discovery() {
        let item = sample_item();
        let task = Task::from_item(&item);
        assert_eq!(task.phase, Phase::Discovery);
        assert_eq!(task.item_id, item.id);
        assert_eq!(task.status, TaskStatus::Active);
        assert!(task.history.is_empty());
        assert_eq!(task.short_id().len(), 8);
    }

    #[test]
    fn test_criteria_navigation() {
        let mut task = Task::from_item(&sample_item());
        assert!(task.current_criterion().is_none());
        task.criteria = vec!["a".into(), "b".into()];
        assert_eq!(task.current_criterion(), Some("a"));
        assert!(task.has_more_criteria());
        task.step = 1;
        assert!(!task.has_more_criteria());
    }

    #[test]
    fn test_artifact_paths_deduplicate() {
        let mut artifacts = Artifacts {
            spec: Some(PathBuf::from("spec.md")),
            ..Default::default()
        };
        artifacts.add_test(PathBuf::from("t.rs"));
        artifacts.add_test(PathBuf::from("t.rs"));
        artifacts.add_implementation(PathBuf::from("lib.rs"));
        assert_eq!(
            artifacts.paths(),
            vec![
                PathBuf::from("spec.md"),
                PathBuf::from("t.rs"),
                PathBuf::from("lib.rs")
            ]
        );
    }

    #[test]
    fn test_task_serialization_roundtrip_keeps_status() {
        let mut task = Task::from_item(&sample_item());
        task.status = TaskStatus::Blocked {
            reason: "missing dependency X".into(),
        };
        let json = serde_json::to_string(&task).unwrap();
        let parsed: Task = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.block_reason(), Some("missing dependency X"));
    }
}
