//! Phase state machine.
//!
//! [`advance`] applies exactly one [`PhaseEvent`] to a task and returns the
//! updated task. It never skips a phase: every edge it takes is checked
//! against [`Phase::can_transition_to`] before it is recorded.

use crate::dispatch::Capability;
use crate::errors::TransitionError;
use crate::phase::Phase;
use crate::task::{ImplArtifactRef, Spec, Task, TaskStatus, TestArtifactRef, TransitionRecord};
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// How a freshly written test behaved when run against the current code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureClass {
    /// Failed because the behavior under test does not exist yet.
    MissingImplementation,
    /// Failed for some other reason (syntax, fixtures, environment).
    Unrelated,
    /// The test passed, so it does not pin down new behavior.
    Passed,
}

/// Inputs to the state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum PhaseEvent {
    ItemSelected,
    SpecProduced(Spec),
    Infeasible { reason: String },
    TestWritten { test: TestArtifactRef, failure: FailureClass },
    ImplementationPassing { implementation: ImplArtifactRef },
    ImplementationFailing { diagnostics: String },
    ValidationPassed,
    ValidationFailed { diagnostics: String },
    RefactorApplied { summary: String },
    CapabilityFailed { capability: Capability, message: String },
    Escalate { reason: String },
}

impl PhaseEvent {
    pub fn name(&self) -> &'static str {
        match self {
            PhaseEvent::ItemSelected => "item-selected",
            PhaseEvent::SpecProduced(_) => "spec-produced",
            PhaseEvent::Infeasible { .. } => "infeasible",
            PhaseEvent::TestWritten { .. } => "test-written",
            PhaseEvent::ImplementationPassing { .. } => "implementation-passing",
            PhaseEvent::ImplementationFailing { .. } => "implementation-failing",
            PhaseEvent::ValidationPassed => "validation-passed",
            PhaseEvent::ValidationFailed { .. } => "validation-failed",
            PhaseEvent::RefactorApplied { .. } => "refactor-applied",
            PhaseEvent::CapabilityFailed { .. } => "capability-failed",
            PhaseEvent::Escalate { .. } => "escalate",
        }
    }
}

/// Bounds applied by the state machine itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleLimits {
    /// Validation failures tolerated before the task is blocked.
    pub validation_retries: u32,
}

impl Default for LifecycleLimits {
    fn default() -> Self {
        Self {
            validation_retries: 3,
        }
    }
}

/// The phase `event` would move `task` to, without applying it.
pub fn next_phase(
    task: &Task,
    event: &PhaseEvent,
    limits: &LifecycleLimits,
) -> Result<Phase, TransitionError> {
    let phase = task.phase;
    if phase.is_terminal() {
        return Err(TransitionError::Terminal { phase });
    }

    let next = match (phase, event) {
        (_, PhaseEvent::CapabilityFailed { .. }) => phase,
        (_, PhaseEvent::Escalate { .. }) => Phase::Blocked,

        (Phase::Discovery, PhaseEvent::ItemSelected) => Phase::Specify,

        (Phase::Specify, PhaseEvent::SpecProduced(spec)) if spec.criteria.is_empty() => {
            Phase::Blocked
        }
        (Phase::Specify, PhaseEvent::SpecProduced(_)) => Phase::Red,
        (Phase::Specify, PhaseEvent::Infeasible { .. }) => Phase::Blocked,

        (Phase::Red, PhaseEvent::TestWritten { failure, .. }) => match failure {
            FailureClass::MissingImplementation => Phase::Green,
            FailureClass::Unrelated | FailureClass::Passed => Phase::Red,
        },

        (Phase::Green, PhaseEvent::ImplementationPassing { .. }) => Phase::Validate,
        (Phase::Green, PhaseEvent::ImplementationFailing { .. }) => Phase::Green,

        (Phase::Validate, PhaseEvent::ValidationPassed) => Phase::Refactor,
        (Phase::Validate, PhaseEvent::ValidationFailed { .. }) => {
            if task.validation_retries >= limits.validation_retries {
                Phase::Blocked
            } else {
                Phase::Green
            }
        }

        (Phase::Refactor, PhaseEvent::RefactorApplied { .. }) => {
            if task.has_more_criteria() {
                Phase::Red
            } else {
                Phase::Complete
            }
        }

        _ => {
            return Err(TransitionError::UnexpectedEvent {
                phase,
                event: event.name().to_string(),
            });
        }
    };

    if !phase.can_transition_to(next) {
        return Err(TransitionError::IllegalTransition {
            from: phase,
            to: next,
        });
    }
    Ok(next)
}

/// Whether applying `event` would leave the task in its current phase.
pub fn is_self_loop(task: &Task, event: &PhaseEvent, limits: &LifecycleLimits) -> bool {
    matches!(next_phase(task, event, limits), Ok(next) if next == task.phase)
}

/// Apply one event, returning the updated task.
pub fn advance(
    task: &Task,
    event: PhaseEvent,
    limits: &LifecycleLimits,
) -> Result<Task, TransitionError> {
    let next = next_phase(task, &event, limits)?;
    let mut updated = task.clone();
    let event_name = event.name();

    match event {
        PhaseEvent::SpecProduced(spec) => {
            if spec.criteria.is_empty() {
                updated.status = TaskStatus::Blocked {
                    reason: "spec has no acceptance criteria".to_string(),
                };
            } else {
                updated.artifacts.spec = Some(spec.path);
                updated.criteria = spec.criteria;
                updated.step = 0;
            }
        }
        PhaseEvent::Infeasible { reason } | PhaseEvent::Escalate { reason } => {
            updated.status = TaskStatus::Blocked { reason };
        }
        PhaseEvent::TestWritten { test, failure } => {
            if failure == FailureClass::MissingImplementation {
                updated.artifacts.add_test(test.path);
            } else {
                updated.last_diagnostics = Some(format!(
                    "test {} not accepted: {:?}",
                    test.path.display(),
                    failure
                ));
            }
        }
        PhaseEvent::ImplementationPassing { implementation } => {
            updated.artifacts.add_implementation(implementation.path);
            updated.last_diagnostics = None;
        }
        PhaseEvent::ImplementationFailing { diagnostics } => {
            updated.last_diagnostics = Some(diagnostics);
        }
        PhaseEvent::ValidationPassed => {
            updated.validation_retries = 0;
            updated.last_diagnostics = None;
        }
        PhaseEvent::ValidationFailed { diagnostics } => {
            if next == Phase::Blocked {
                updated.status = TaskStatus::Blocked {
                    reason: format!(
                        "validation failed after {} retries: {}",
                        task.validation_retries,
                        first_line(&diagnostics)
                    ),
                };
            } else {
                updated.validation_retries += 1;
            }
            updated.last_diagnostics = Some(diagnostics);
        }
        PhaseEvent::RefactorApplied { .. } => {
            if next == Phase::Red {
                updated.step += 1;
            }
        }
        PhaseEvent::CapabilityFailed {
            capability,
            message,
        } => {
            updated.last_diagnostics = Some(format!("{}: {}", capability, message));
        }
        PhaseEvent::ItemSelected => {}
    }

    if next == Phase::Complete {
        updated.status = TaskStatus::Complete;
    }
    updated.phase = next;
    updated.history.push(TransitionRecord {
        from: task.phase,
        to: next,
        event: event_name.to_string(),
        at: Utc::now(),
    });
    Ok(updated)
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or("").trim()
}
