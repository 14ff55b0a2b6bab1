use super::state::{OrchestratorState, RunLock, StateStore};
use super::summary::{RunOutcome, RunSummary, TickOutcome};
use crate::audit::{AuditLogger, DispatchDecision, DispatchRecord, TaskArchive};
use crate::backlog::Inbox;
use crate::breakers::{
    AbortReason, BreakerConfig, BreakerInputs, BreakerOutcome, LoadAverageMonitor,
    ResourceMonitor, StopSignal, StuckVerdict, check_breakers,
};
use crate::capabilities::{SpecOutcome, Workers};
use crate::config::Config;
use crate::coverage::{CoverageGate, GateResult};
use crate::discovery::{DiscoveryEngine, ScanContext};
use crate::dispatch::{self, Dispatch, RateDecision, RateLimiter};
use crate::errors::{CapabilityError, OrchestratorError};
use crate::lifecycle::{self, LifecycleLimits, PhaseEvent};
use crate::phase::Phase;
use crate::policy::{PolicyProvider, RulePolicy};
use crate::task::{Spec, Task, TaskStatus, TestArtifactRef};
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Longest single sleep while throttled, so a stop request is seen promptly.
const MAX_THROTTLE_SLEEP: Duration = Duration::from_secs(5);

/// Drives one project: supervises, fills the active slot and advances the
/// active task one phase per tick.
pub struct Orchestrator {
    workers: Workers,
    policy: Arc<dyn PolicyProvider>,
    monitor: Option<Arc<dyn ResourceMonitor>>,
    breaker_config: BreakerConfig,
    limits: LifecycleLimits,
    rate_limiter: RateLimiter,
    coverage: CoverageGate,
    discovery: DiscoveryEngine,
    stop: StopSignal,
    inbox: Inbox,
    audit: AuditLogger,
    store: StateStore,
    lock_file: PathBuf,
    project_dir: PathBuf,
    allow_exhaustion: bool,
}

impl Orchestrator {
    pub fn new(config: &Config, workers: Workers) -> Self {
        let toml = config.toml();
        let breaker_config = toml.breakers.to_breaker_config();
        let monitor: Option<Arc<dyn ResourceMonitor>> = breaker_config
            .max_load_average
            .map(|_| Arc::new(LoadAverageMonitor::default()) as Arc<dyn ResourceMonitor>);

        Self {
            coverage: CoverageGate::new(workers.probes.clone(), toml.coverage.thresholds()),
            discovery: DiscoveryEngine::new(
                workers.scanners.clone(),
                workers.researcher.clone(),
                toml.discovery.research_topic.clone(),
            ),
            workers,
            policy: Arc::new(RulePolicy::new()),
            monitor,
            breaker_config,
            limits: toml.lifecycle.to_limits(),
            rate_limiter: toml.dispatch.to_rate_limiter(),
            stop: StopSignal::new(&config.stop_file),
            inbox: Inbox::new(&config.inbox_file),
            audit: AuditLogger::new(&config.audit_dir),
            store: StateStore::new(&config.state_file),
            lock_file: config.lock_file.clone(),
            project_dir: config.project_dir.clone(),
            allow_exhaustion: toml.discovery.allow_exhaustion,
        }
    }

    pub fn with_policy(mut self, policy: Arc<dyn PolicyProvider>) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_monitor(mut self, monitor: Arc<dyn ResourceMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    pub fn with_breaker_config(mut self, config: BreakerConfig) -> Self {
        self.breaker_config = config;
        self
    }

    pub fn with_limits(mut self, limits: LifecycleLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_rate_limiter(mut self, limiter: RateLimiter) -> Self {
        self.rate_limiter = limiter;
        self
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Tick until a breaker trips or `max_ticks` is reached, persisting the
    /// snapshot after every tick. `on_tick` observes each outcome.
    pub async fn run<F>(
        &self,
        state: &mut OrchestratorState,
        max_ticks: Option<u64>,
        mut on_tick: F,
    ) -> Result<RunSummary, OrchestratorError>
    where
        F: FnMut(&TickOutcome, &OrchestratorState),
    {
        let _lock = RunLock::acquire(&self.lock_file)?;
        state.breakers.begin_segment(Utc::now());
        tracing::info!(
            backlog = state.backlog.len(),
            iterations = state.breakers.iterations,
            "run started"
        );

        let mut ticks = 0u64;
        let outcome = loop {
            if let Some(max) = max_ticks
                && ticks >= max
            {
                break RunOutcome::TickLimit { max_ticks: max };
            }

            let result = self.tick(state).await;
            ticks += 1;
            self.store.save(state)?;
            if let Err(e) = self.inbox.acknowledge() {
                tracing::warn!(error = %e, "failed to acknowledge backlog inbox");
            }
            let outcome = result?;
            on_tick(&outcome, state);

            match outcome {
                TickOutcome::Paused(reason) => break RunOutcome::Paused { reason },
                TickOutcome::Aborted(reason) => {
                    if reason == AbortReason::StopRequested {
                        self.stop.clear()?;
                    }
                    break RunOutcome::Aborted { reason };
                }
                TickOutcome::Throttled { wait } => {
                    tokio::time::sleep(wait.min(MAX_THROTTLE_SLEEP)).await;
                }
                _ => {}
            }
        };

        tracing::info!(reason = %outcome.reason(), ticks, "run finished");
        Ok(RunSummary::new(outcome, ticks, state))
    }

    /// One supervision step.
    pub async fn tick(
        &self,
        state: &mut OrchestratorState,
    ) -> Result<TickOutcome, OrchestratorError> {
        state.stats.ticks += 1;

        if self.stop.is_raised() {
            state.breakers.stop_requested = true;
        }
        self.claim_inbox(state);

        let inputs = BreakerInputs {
            now: Utc::now(),
            load_average: self.monitor.as_ref().and_then(|m| m.sample()),
        };

        match check_breakers(&state.breakers, &self.breaker_config, &inputs) {
            BreakerOutcome::Continue => {}
            BreakerOutcome::Pause(reason) => {
                tracing::warn!(%reason, "circuit breaker paused the loop");
                state.breakers.acknowledge_pause(&reason);
                return Ok(TickOutcome::Paused(reason));
            }
            BreakerOutcome::Abort(reason) => {
                tracing::warn!(%reason, "circuit breaker aborted the loop");
                // The sentinel file is removed by `run` once this is persisted.
                state.breakers.stop_requested = false;
                return Ok(TickOutcome::Aborted(reason));
            }
        }

        match state.active_task.clone() {
            Some(task) if task.is_terminal() => self.finish(state, task).await,
            Some(task) => self.work_on(state, task).await,
            None => self.fill_slot(state).await,
        }
    }

    fn claim_inbox(&self, state: &mut OrchestratorState) {
        match self.inbox.claim() {
            Ok(items) if !items.is_empty() => {
                let received = items.len();
                let added = state.backlog.extend(items);
                if added > 0 {
                    state.breakers.record_work_found();
                }
                tracing::info!(received, added, "backlog inbox claimed");
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "failed to claim backlog inbox"),
        }
    }

    async fn fill_slot(
        &self,
        state: &mut OrchestratorState,
    ) -> Result<TickOutcome, OrchestratorError> {
        if let Some(item) = self.policy.select_next(&state.backlog).cloned() {
            let task = lifecycle::advance(
                &Task::from_item(&item),
                PhaseEvent::ItemSelected,
                &self.limits,
            )?;
            state.backlog.mark_in_progress(&item.id)?;
            state.breakers.record_work_found();
            tracing::info!(task = %task.short_id(), item = %item.id, title = %item.title, "task started");

            let outcome = TickOutcome::Promoted {
                task_id: task.id.clone(),
                title: task.title.clone(),
            };
            state.active_task = Some(task);
            return Ok(outcome);
        }

        state.discovery_generation += 1;
        let context = ScanContext {
            project_dir: self.project_dir.clone(),
            generation: state.discovery_generation,
            known_ids: state.backlog.ids(),
            allow_exhaustion: self.allow_exhaustion,
        };
        let discovered = self.discovery.run(&context).await;
        let tier = discovered.tier;
        let added = state.backlog.extend(discovered.items.into_vec());
        state.breakers.record_discovery(added);
        state.stats.discovered += added as u32;

        Ok(TickOutcome::Discovered { tier, added })
    }

    async fn work_on(
        &self,
        state: &mut OrchestratorState,
        task: Task,
    ) -> Result<TickOutcome, OrchestratorError> {
        let dispatch = dispatch::dispatch(&task);

        if let RateDecision::Throttled { wait } =
            self.rate_limiter.acquire(&mut state.rate_window, Utc::now())
        {
            self.log_dispatch(&task, &dispatch, DispatchDecision::Throttled);
            tracing::info!(wait_secs = wait.as_secs(), "dispatch throttled");
            return Ok(TickOutcome::Throttled { wait });
        }
        self.log_dispatch(&task, &dispatch, DispatchDecision::Dispatched);
        tracing::info!(
            task = %task.short_id(),
            phase = %task.phase,
            capability = %dispatch.capability,
            "dispatching"
        );

        let (event, gate) = match self.invoke(&task, &dispatch).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(task = %task.short_id(), phase = %task.phase, error = %e, "capability failed");
                (
                    PhaseEvent::CapabilityFailed {
                        capability: dispatch.capability,
                        message: e.to_string(),
                    },
                    None,
                )
            }
        };

        let event = if lifecycle::is_self_loop(&task, &event, &self.limits) {
            match state.breakers.record_failure(
                &task.id,
                task.phase,
                self.breaker_config.stuck_threshold,
            ) {
                StuckVerdict::Retry(count) => {
                    tracing::info!(task = %task.short_id(), phase = %task.phase, count, "phase will be retried");
                    event
                }
                StuckVerdict::Escalate(count) => PhaseEvent::Escalate {
                    reason: format!(
                        "stuck in {} after {} consecutive failures: {}",
                        task.phase,
                        count,
                        event_detail(&event)
                    ),
                },
            }
        } else {
            event
        };

        let mut updated = lifecycle::advance(&task, event, &self.limits)?;
        if updated.phase != task.phase {
            state.breakers.reset_task(&task.id);
        }

        if let Some(gate) = gate {
            let added = state.backlog.requeue(gate.new_items);
            state.stats.discovered += added as u32;
            updated.coverage = Some(gate.report.clone());
            state.last_coverage = Some(gate.report);
        }

        if updated.is_terminal() {
            return self.finish(state, updated).await;
        }

        let outcome = TickOutcome::Advanced {
            task_id: updated.id.clone(),
            from: task.phase,
            to: updated.phase,
        };
        state.active_task = Some(updated);
        Ok(outcome)
    }

    /// Call the capability for the task's phase and translate its result.
    async fn invoke(
        &self,
        task: &Task,
        dispatch: &Dispatch,
    ) -> Result<(PhaseEvent, Option<GateResult>), CapabilityError> {
        let payload = &dispatch.payload;
        let context = payload.context.clone().unwrap_or_default();

        let event = match task.phase {
            // Selection is applied on promotion; a snapshot that still holds
            // an unselected task is selected now.
            Phase::Discovery => PhaseEvent::ItemSelected,
            Phase::Specify => {
                let description = format!("{}\n\n{}", task.title, task.description);
                match self
                    .workers
                    .specifier
                    .produce_spec(description.trim(), &context)
                    .await?
                {
                    SpecOutcome::Spec(spec) => PhaseEvent::SpecProduced(spec),
                    SpecOutcome::Infeasible { reason } => PhaseEvent::Infeasible { reason },
                }
            }
            Phase::Red => {
                let spec = Spec {
                    path: task.artifacts.spec.clone().unwrap_or_default(),
                    criteria: task.criteria.clone(),
                    summary: task.title.clone(),
                };
                let test = self
                    .workers
                    .test_writer
                    .write_test(&spec, &payload.target)
                    .await?;
                let run = self
                    .workers
                    .validator
                    .run_validation(std::slice::from_ref(&test.path))
                    .await?;
                let failure = self.policy.classify_red(&run);
                PhaseEvent::TestWritten { test, failure }
            }
            Phase::Green => {
                let Some(path) = task.artifacts.tests.last() else {
                    return Err(CapabilityError::failed(
                        dispatch.capability.to_string(),
                        "no failing test to implement against",
                    ));
                };
                let test = TestArtifactRef {
                    path: path.clone(),
                    name: payload.target.clone(),
                };
                let implementation = self
                    .workers
                    .implementer
                    .write_implementation(&test, &payload.constraints)
                    .await?;
                let run = self
                    .workers
                    .validator
                    .run_validation(&[test.path.clone(), implementation.path.clone()])
                    .await?;
                if run.passed {
                    PhaseEvent::ImplementationPassing { implementation }
                } else {
                    PhaseEvent::ImplementationFailing {
                        diagnostics: run.diagnostics,
                    }
                }
            }
            Phase::Validate => {
                let run = self
                    .workers
                    .validator
                    .run_validation(&task.artifacts.paths())
                    .await?;
                if !run.passed {
                    return Ok((
                        PhaseEvent::ValidationFailed {
                            diagnostics: run.diagnostics,
                        },
                        None,
                    ));
                }
                let gate = self.coverage.evaluate(task).await;
                return Ok((PhaseEvent::ValidationPassed, Some(gate)));
            }
            Phase::Refactor => {
                let suggestions = self
                    .workers
                    .refactorer
                    .propose_refactors(&task.artifacts.paths())
                    .await?;
                let mut applied = Vec::new();
                for suggestion in &suggestions {
                    let result = self.workers.refactorer.apply_refactor(suggestion).await?;
                    if result.applied {
                        applied.push(if result.summary.is_empty() {
                            suggestion.description.clone()
                        } else {
                            result.summary
                        });
                    }
                }
                let summary = if applied.is_empty() {
                    "no refactor needed".to_string()
                } else {
                    applied.join("; ")
                };
                PhaseEvent::RefactorApplied { summary }
            }
            Phase::Complete | Phase::Blocked => {
                return Err(CapabilityError::failed(
                    dispatch.capability.to_string(),
                    format!("task is already {}", task.phase),
                ));
            }
        };
        Ok((event, None))
    }

    /// Release a terminal task: update its backlog item, archive it and free
    /// the active slot.
    async fn finish(
        &self,
        state: &mut OrchestratorState,
        task: Task,
    ) -> Result<TickOutcome, OrchestratorError> {
        let mut archive = TaskArchive::new(task.clone());

        let outcome = match &task.status {
            TaskStatus::Blocked { reason } => {
                let priority = state
                    .backlog
                    .get(&task.item_id)
                    .map(|item| item.priority)
                    .unwrap_or_default();
                state.backlog.mark_blocked(
                    &task.item_id,
                    reason,
                    self.policy.priority_after_block(priority),
                )?;

                let topic = format!(
                    "Why is \"{}\" blocked and what would unblock it? {}",
                    task.title, reason
                );
                match self.workers.researcher.query(&topic).await {
                    Ok(findings) => archive.investigation = findings,
                    Err(e) => tracing::warn!(task = %task.short_id(), error = %e, "block investigation failed"),
                }

                state.stats.blocked += 1;
                tracing::warn!(task = %task.short_id(), %reason, "task blocked");
                TickOutcome::Blocked {
                    task_id: task.id.clone(),
                    title: task.title.clone(),
                    reason: reason.clone(),
                }
            }
            TaskStatus::Complete | TaskStatus::Active => {
                match self.workers.committer.finalize(&task).await {
                    Ok(commit) => archive.commit = Some(commit),
                    Err(e) => tracing::warn!(task = %task.short_id(), error = %e, "commit failed"),
                }
                state.backlog.mark_done(&task.item_id)?;
                state.stats.completed += 1;
                tracing::info!(task = %task.short_id(), title = %task.title, "task complete");
                TickOutcome::Completed {
                    task_id: task.id.clone(),
                    title: task.title.clone(),
                }
            }
        };

        state.breakers.record_iteration(&task.id);
        if let Err(e) = self.audit.archive_task(&archive) {
            tracing::warn!(task = %task.short_id(), error = %e, "failed to archive task");
        }
        state.active_task = None;
        Ok(outcome)
    }

    fn log_dispatch(&self, task: &Task, dispatch: &Dispatch, decision: DispatchDecision) {
        let record = DispatchRecord {
            at: Utc::now(),
            task_id: task.id.clone(),
            phase: task.phase,
            capability: dispatch.capability,
            objective: dispatch.payload.objective.clone(),
            decision,
        };
        if let Err(e) = self.audit.log_dispatch(&record) {
            tracing::warn!(error = %e, "failed to record dispatch");
        }
    }
}

/// The diagnostic carried by a self-looping event.
fn event_detail(event: &PhaseEvent) -> String {
    let detail = match event {
        PhaseEvent::CapabilityFailed { message, .. } => message.as_str(),
        PhaseEvent::ImplementationFailing { diagnostics }
        | PhaseEvent::ValidationFailed { diagnostics } => diagnostics.as_str(),
        PhaseEvent::TestWritten { failure, .. } => {
            return format!("test was not a missing-implementation failure ({:?})", failure);
        }
        _ => event.name(),
    };
    detail.lines().next().unwrap_or("").trim().to_string()
}
