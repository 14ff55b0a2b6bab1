//! Circuit breaker supervisor.
//!
//! Safety limits that stop runaway execution. [`check_breakers`] is a pure
//! function of the breaker state, the configuration and the inputs sampled
//! for this tick, so calling it twice without mutating anything yields the
//! same outcome. Breakers are evaluated in a fixed order: external stop,
//! empty backlog, wall clock, iteration cap, resource pressure.
//!
//! Stuck-task detection is separate: [`CircuitBreakerState::record_failure`]
//! counts consecutive self-loops per (task, phase) and tells the caller when
//! to escalate.

mod resource;
mod stop;

pub use resource::{LoadAverageMonitor, ResourceMonitor};
pub use stop::StopSignal;

use crate::phase::Phase;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Limits enforced by the supervisor.
#[derive(Debug, Clone, PartialEq)]
pub struct BreakerConfig {
    /// Completed-or-blocked tasks per cap window. `0` disables the cap.
    pub max_iterations: u32,
    /// Wall-clock limit per run segment in seconds. `0` disables it.
    pub max_wall_clock_secs: u64,
    /// Consecutive failures of one (task, phase) before escalation.
    pub stuck_threshold: u32,
    /// Consecutive fruitless discovery passes before aborting.
    pub empty_backlog_limit: u32,
    /// Load average above which the loop pauses. `None` disables sampling.
    pub max_load_average: Option<f64>,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            max_wall_clock_secs: 8 * 60 * 60,
            stuck_threshold: 5,
            empty_backlog_limit: 3,
            max_load_average: None,
        }
    }
}

/// Persistent supervisor counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerState {
    /// Tasks that reached Complete or Blocked.
    pub iterations: u32,
    /// Iteration count at which the current cap window started.
    #[serde(default)]
    pub cap_baseline: u32,
    /// Start of the current run segment.
    pub segment_started_at: DateTime<Utc>,
    /// Consecutive self-loop failures keyed by `task-id/phase`.
    #[serde(default)]
    pub failures: BTreeMap<String, u32>,
    #[serde(default)]
    pub empty_backlog_ticks: u32,
    #[serde(default)]
    pub stop_requested: bool,
}

impl Default for CircuitBreakerState {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

/// Values sampled once per tick and fed to [`check_breakers`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BreakerInputs {
    pub now: DateTime<Utc>,
    pub load_average: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum PauseReason {
    IterationCap { iterations: u32, cap: u32 },
    WallClock { elapsed_secs: u64, limit_secs: u64 },
    ResourcePressure { load: f64, limit: f64 },
}

impl fmt::Display for PauseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PauseReason::IterationCap { iterations, cap } => {
                write!(f, "iteration cap reached ({} iterations, cap {})", iterations, cap)
            }
            PauseReason::WallClock {
                elapsed_secs,
                limit_secs,
            } => write!(
                f,
                "wall-clock limit reached ({}s elapsed, limit {}s)",
                elapsed_secs, limit_secs
            ),
            PauseReason::ResourcePressure { load, limit } => {
                write!(f, "load average {:.2} above limit {:.2}", load, limit)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum AbortReason {
    StopRequested,
    NothingLeftToDo { empty_ticks: u32 },
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::StopRequested => write!(f, "external stop requested"),
            AbortReason::NothingLeftToDo { .. } => write!(f, "nothing left to do"),
        }
    }
}

/// Decision returned by [`check_breakers`].
#[derive(Debug, Clone, PartialEq)]
pub enum BreakerOutcome {
    Continue,
    Pause(PauseReason),
    Abort(AbortReason),
}

impl BreakerOutcome {
    pub fn is_continue(&self) -> bool {
        matches!(self, BreakerOutcome::Continue)
    }
}

/// Verdict of stuck-task detection for one failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StuckVerdict {
    Retry(u32),
    Escalate(u32),
}

/// Evaluate every breaker against the current state.
pub fn check_breakers(
    state: &CircuitBreakerState,
    config: &BreakerConfig,
    inputs: &BreakerInputs,
) -> BreakerOutcome {
    if state.stop_requested {
        return BreakerOutcome::Abort(AbortReason::StopRequested);
    }

    if config.empty_backlog_limit > 0 && state.empty_backlog_ticks >= config.empty_backlog_limit
    {
        return BreakerOutcome::Abort(AbortReason::NothingLeftToDo {
            empty_ticks: state.empty_backlog_ticks,
        });
    }

    if config.max_wall_clock_secs > 0 {
        let elapsed = (inputs.now - state.segment_started_at).num_seconds().max(0) as u64;
        if elapsed >= config.max_wall_clock_secs {
            return BreakerOutcome::Pause(PauseReason::WallClock {
                elapsed_secs: elapsed,
                limit_secs: config.max_wall_clock_secs,
            });
        }
    }

    if config.max_iterations > 0
        && state.iterations.saturating_sub(state.cap_baseline) >= config.max_iterations
    {
        return BreakerOutcome::Pause(PauseReason::IterationCap {
            iterations: state.iterations,
            cap: config.max_iterations,
        });
    }

    if let (Some(limit), Some(load)) = (config.max_load_average, inputs.load_average)
        && load > limit
    {
        return BreakerOutcome::Pause(PauseReason::ResourcePressure { load, limit });
    }

    BreakerOutcome::Continue
}

fn failure_key(task_id: &str, phase: Phase) -> String {
    format!("{}/{}", task_id, phase)
}

impl CircuitBreakerState {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            iterations: 0,
            cap_baseline: 0,
            segment_started_at: now,
            failures: BTreeMap::new(),
            empty_backlog_ticks: 0,
            stop_requested: false,
        }
    }

    /// Start a new run segment; the wall clock is measured from here.
    pub fn begin_segment(&mut self, now: DateTime<Utc>) {
        self.segment_started_at = now;
    }

    /// Record that a pause was honored. An iteration-cap pause opens a new
    /// cap window so it is reported once per window.
    pub fn acknowledge_pause(&mut self, reason: &PauseReason) {
        if let PauseReason::IterationCap { .. } = reason {
            self.cap_baseline = self.iterations;
        }
    }

    /// Record a consecutive failure of `task_id` in `phase`.
    pub fn record_failure(&mut self, task_id: &str, phase: Phase, threshold: u32) -> StuckVerdict {
        let count = self.failures.entry(failure_key(task_id, phase)).or_insert(0);
        *count += 1;
        if threshold > 0 && *count >= threshold {
            StuckVerdict::Escalate(*count)
        } else {
            StuckVerdict::Retry(*count)
        }
    }

    pub fn failure_count(&self, task_id: &str, phase: Phase) -> u32 {
        self.failures
            .get(&failure_key(task_id, phase))
            .copied()
            .unwrap_or(0)
    }

    /// Forget every failure counter of a task after a productive transition.
    pub fn reset_task(&mut self, task_id: &str) {
        let prefix = format!("{}/", task_id);
        self.failures.retain(|key, _| !key.starts_with(&prefix));
    }

    /// A task reached Complete or Blocked.
    pub fn record_iteration(&mut self, task_id: &str) {
        self.iterations += 1;
        self.reset_task(task_id);
    }

    /// Record a discovery pass that added `added` new items.
    pub fn record_discovery(&mut self, added: usize) {
        if added == 0 {
            self.empty_backlog_ticks += 1;
        } else {
            self.empty_backlog_ticks = 0;
        }
    }

    /// Work was found without discovery (a pending item was promoted).
    pub fn record_work_found(&mut self) {
        self.empty_backlog_ticks = 0;
    }
}
