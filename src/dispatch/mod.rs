//! Delegation dispatcher.
//!
//! Maps a task's phase to the worker capability responsible for it and the
//! instruction payload that capability receives. Dispatch is total over
//! [`Phase`] and has no side effects: it never invokes a worker and never
//! retries. Invocation and retry are the orchestrator's business.

mod rate_limit;

pub use rate_limit::{RateDecision, RateLimiter, RateWindow};

use crate::phase::Phase;
use crate::task::Task;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Worker roles the orchestrator delegates to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    Researcher,
    Specifier,
    TestWriter,
    Implementer,
    Validator,
    Refactorer,
    Committer,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Capability::Researcher => "researcher",
            Capability::Specifier => "specifier",
            Capability::TestWriter => "test-writer",
            Capability::Implementer => "implementer",
            Capability::Validator => "validator",
            Capability::Refactorer => "refactorer",
            Capability::Committer => "committer",
        };
        write!(f, "{}", s)
    }
}

/// What a capability is asked to do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstructionPayload {
    pub objective: String,
    pub target: String,
    #[serde(default)]
    pub constraints: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dispatch {
    pub capability: Capability,
    pub payload: InstructionPayload,
}

/// The capability responsible for `phase`.
pub fn capability_for(phase: Phase) -> Capability {
    match phase {
        Phase::Discovery | Phase::Blocked => Capability::Researcher,
        Phase::Specify => Capability::Specifier,
        Phase::Red => Capability::TestWriter,
        Phase::Green => Capability::Implementer,
        Phase::Validate => Capability::Validator,
        Phase::Refactor => Capability::Refactorer,
        Phase::Complete => Capability::Committer,
    }
}

/// Build the delegation for the task's current phase.
pub fn dispatch(task: &Task) -> Dispatch {
    let capability = capability_for(task.phase);
    let criterion = task.current_criterion().unwrap_or(&task.title).to_string();

    let (objective, target, mut constraints) = match task.phase {
        Phase::Discovery => (
            format!("Gather context for: {}", task.title),
            task.title.clone(),
            vec!["Do not modify any files".to_string()],
        ),
        Phase::Specify => (
            format!("Write a feasible specification for: {}", task.title),
            task.description.clone(),
            vec![
                "List testable acceptance criteria".to_string(),
                "Report the task as infeasible if a prerequisite is missing".to_string(),
            ],
        ),
        Phase::Red => (
            format!(
                "Write one failing test for criterion {} of {}",
                task.step + 1,
                task.criteria.len().max(1)
            ),
            criterion,
            vec![
                "The test must fail because the behavior is not implemented".to_string(),
                "Do not write implementation code".to_string(),
            ],
        ),
        Phase::Green => (
            "Make the failing test pass with the smallest change".to_string(),
            criterion,
            vec!["Do not modify the test".to_string()],
        ),
        Phase::Validate => (
            "Run build, lint and the full test suite".to_string(),
            task.title.clone(),
            Vec::new(),
        ),
        Phase::Refactor => (
            "Refactor the new code without changing behavior".to_string(),
            criterion,
            vec!["All tests must still pass".to_string()],
        ),
        Phase::Complete => (
            format!("Finalize and commit: {}", task.title),
            task.title.clone(),
            Vec::new(),
        ),
        Phase::Blocked => (
            "Investigate why the task is blocked".to_string(),
            task.block_reason().unwrap_or(&task.title).to_string(),
            vec!["Do not modify any files".to_string()],
        ),
    };

    if let Some(diagnostics) = &task.last_diagnostics
        && !task.is_terminal()
    {
        constraints.push(format!(
            "Address the diagnostics from the previous attempt:\n{}",
            diagnostics.trim()
        ));
    }

    let context = task
        .last_diagnostics
        .as_ref()
        .map(|diag| format!("Previous attempt:\n{}", diag));

    Dispatch {
        capability,
        payload: InstructionPayload {
            objective,
            target,
            constraints,
            context,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backlog::{BacklogItem, Complexity, Priority, SignalSource};

    fn task_in(phase: Phase) -> Task {
        let item = BacklogItem::new(
            "Add login",
            "Users log in with email",
            Priority::High,
            Complexity::Small,
            SignalSource::Manual,
        );
        let mut task = Task::from_item(&item);
        task.phase = phase;
        task.criteria = vec!["valid credentials succeed".into(), "bad password fails".into()];
        task
    }

    #[test]
    fn test_dispatch_table() {
        let expected = [
            (Phase::Discovery, Capability::Researcher),
            (Phase::Specify, Capability::Specifier),
            (Phase::Red, Capability::TestWriter),
            (Phase::Green, Capability::Implementer),
            (Phase::Validate, Capability::Validator),
            (Phase::Refactor, Capability::Refactorer),
            (Phase::Complete, Capability::Committer),
            (Phase::Blocked, Capability::Researcher),
        ];
        for (phase, capability) in expected {
            assert_eq!(dispatch(&task_in(phase)).capability, capability, "{}", phase);
        }
    }

    #[test]
    fn test_red_targets_current_criterion() {
        let mut task = task_in(Phase::Red);
        task.step = 1;
        let d = dispatch(&task);
        assert_eq!(d.payload.target, "bad password fails");
        assert!(d.payload.objective.contains("criterion 2 of 2"));
    }

    #[test]
    fn test_retry_adds_diagnostics_to_context() {
        let mut task = task_in(Phase::Green);
        task.last_diagnostics = Some("assertion failed".into());
        let d = dispatch(&task);
        assert!(d.payload.context.unwrap().contains("assertion failed"));
        assert!(
            d.payload
                .constraints
                .iter()
                .any(|c| c.contains("previous attempt") && c.contains("assertion failed"))
        );
    }

    #[test]
    fn test_dispatch_is_deterministic() {
        let task = task_in(Phase::Validate);
        assert_eq!(dispatch(&task), dispatch(&task));
    }

    #[test]
    fn test_capability_display() {
        assert_eq!(Capability::TestWriter.to_string(), "test-writer");
    }
}
