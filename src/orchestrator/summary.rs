use super::state::OrchestratorState;
use crate::backlog::BacklogSummary;
use crate::breakers::{AbortReason, PauseReason};
use crate::coverage::CoverageReport;
use crate::discovery::DiscoveryTier;
use crate::phase::Phase;
use serde::Serialize;
use std::time::Duration;

/// What one tick did.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Paused(PauseReason),
    Aborted(AbortReason),
    /// A pending item became the active task.
    Promoted { task_id: String, title: String },
    /// Discovery ran because nothing was pending.
    Discovered { tier: DiscoveryTier, added: usize },
    /// The active task moved (or self-looped) without finishing.
    Advanced {
        task_id: String,
        from: Phase,
        to: Phase,
    },
    Completed { task_id: String, title: String },
    Blocked {
        task_id: String,
        title: String,
        reason: String,
    },
    /// The rate limiter held the dispatch back; nothing changed.
    Throttled { wait: Duration },
}

impl TickOutcome {
    pub fn describe(&self) -> String {
        match self {
            TickOutcome::Paused(reason) => format!("paused: {}", reason),
            TickOutcome::Aborted(reason) => format!("aborted: {}", reason),
            TickOutcome::Promoted { title, .. } => format!("started '{}'", title),
            TickOutcome::Discovered { tier, added } => {
                format!("discovery ({}) added {} item(s)", tier, added)
            }
            TickOutcome::Advanced { from, to, .. } if from == to => format!("retrying {}", to),
            TickOutcome::Advanced { from, to, .. } => format!("{} -> {}", from, to),
            TickOutcome::Completed { title, .. } => format!("completed '{}'", title),
            TickOutcome::Blocked { title, reason, .. } => {
                format!("blocked '{}': {}", title, reason)
            }
            TickOutcome::Throttled { wait } => {
                format!("rate limited, waiting {}s", wait.as_secs().max(1))
            }
        }
    }
}

/// Why a run stopped ticking.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum RunOutcome {
    Paused {
        #[serde(rename = "cause")]
        reason: PauseReason,
    },
    Aborted {
        #[serde(rename = "cause")]
        reason: AbortReason,
    },
    /// `--max-ticks` was reached.
    TickLimit { max_ticks: u64 },
}

impl RunOutcome {
    pub fn reason(&self) -> String {
        match self {
            RunOutcome::Paused { reason } => reason.to_string(),
            RunOutcome::Aborted { reason } => reason.to_string(),
            RunOutcome::TickLimit { max_ticks } => format!("tick limit of {} reached", max_ticks),
        }
    }

    fn next_action(&self) -> &'static str {
        match self {
            RunOutcome::Paused {
                reason: PauseReason::IterationCap { .. },
            } => "review the completed work, then `loopsmith run` to start a new iteration window",
            RunOutcome::Paused {
                reason: PauseReason::WallClock { .. },
            } => "`loopsmith run` to start a new run segment",
            RunOutcome::Paused {
                reason: PauseReason::ResourcePressure { .. },
            } => "wait for the host load to drop, then `loopsmith run`",
            RunOutcome::Aborted {
                reason: AbortReason::StopRequested,
            } => "`loopsmith run` to resume from the saved state",
            RunOutcome::Aborted {
                reason: AbortReason::NothingLeftToDo { .. },
            } => "add work with `loopsmith backlog add`",
            RunOutcome::TickLimit { .. } => "`loopsmith run` to continue",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveTaskSummary {
    pub id: String,
    pub title: String,
    pub phase: Phase,
    pub step: usize,
    pub criteria: usize,
}

impl ActiveTaskSummary {
    fn from_state(state: &OrchestratorState) -> Option<Self> {
        state.active_task.as_ref().map(|task| Self {
            id: task.id.clone(),
            title: task.title.clone(),
            phase: task.phase,
            step: task.step,
            criteria: task.criteria.len(),
        })
    }
}

/// Printed when `loopsmith run` returns.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    #[serde(flatten)]
    pub outcome: RunOutcome,
    pub reason: String,
    /// Ticks executed by this run.
    pub ticks: u64,
    /// Tasks finished (completed or blocked) over the project's lifetime.
    pub iterations: u32,
    pub completed: u32,
    pub blocked: u32,
    pub discovered: u32,
    pub active_task: Option<ActiveTaskSummary>,
    pub next_action: String,
}

impl RunSummary {
    pub fn new(outcome: RunOutcome, ticks: u64, state: &OrchestratorState) -> Self {
        Self {
            reason: outcome.reason(),
            next_action: outcome.next_action().to_string(),
            outcome,
            ticks,
            iterations: state.breakers.iterations,
            completed: state.stats.completed,
            blocked: state.stats.blocked,
            discovered: state.stats.discovered,
            active_task: ActiveTaskSummary::from_state(state),
        }
    }
}

/// Snapshot view for `loopsmith status`.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub active_task: Option<ActiveTaskSummary>,
    pub backlog: BacklogSummary,
    pub iterations: u32,
    pub ticks: u64,
    pub completed: u32,
    pub blocked: u32,
    pub discovered: u32,
    pub empty_backlog_ticks: u32,
    /// Largest consecutive-failure count of any (task, phase).
    pub max_consecutive_failures: u32,
    pub recent_dispatches: usize,
    pub stop_requested: bool,
    pub last_coverage: Option<CoverageReport>,
}

impl StatusReport {
    pub fn new(state: &OrchestratorState, stop_raised: bool) -> Self {
        Self {
            active_task: ActiveTaskSummary::from_state(state),
            backlog: state.backlog.summary(),
            iterations: state.breakers.iterations,
            ticks: state.stats.ticks,
            completed: state.stats.completed,
            blocked: state.stats.blocked,
            discovered: state.stats.discovered,
            empty_backlog_ticks: state.breakers.empty_backlog_ticks,
            max_consecutive_failures: state.breakers.failures.values().copied().max().unwrap_or(0),
            recent_dispatches: state.rate_window.len(),
            stop_requested: stop_raised || state.breakers.stop_requested,
            last_coverage: state.last_coverage.clone(),
        }
    }
}
