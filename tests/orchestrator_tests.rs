//! End-to-end tests of the tick loop against in-memory workers.

use async_trait::async_trait;
use loopsmith::audit::{AuditLogger, DispatchDecision};
use loopsmith::backlog::{BacklogItem, Complexity, Inbox, ItemStatus, Priority, SignalSource};
use loopsmith::breakers::{AbortReason, BreakerConfig, PauseReason, StopSignal};
use loopsmith::capabilities::{
    CapabilityResult, CommitRef, Committer, CoverageProbe, Implementer, RefactorResult,
    Refactorer, Researcher, SpecOutcome, Specifier, Suggestion, TestWriter, ValidationResult,
    Validator, Workers,
};
use loopsmith::config::Config;
use loopsmith::coverage::CoverageCategory;
use loopsmith::discovery::Finding;
use loopsmith::dispatch::RateLimiter;
use loopsmith::errors::CapabilityError;
use loopsmith::init::init_project;
use loopsmith::orchestrator::{Orchestrator, OrchestratorState, RunOutcome, TickOutcome};
use loopsmith::phase::Phase;
use loopsmith::task::{ImplArtifactRef, Spec, Task, TestArtifactRef};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Scripted worker covering every single-role capability.
///
/// Validation fails with a missing-symbol error until an implementation
/// under `src/` is part of the run, so the red/green cycle behaves like a
/// real project.
#[derive(Default)]
struct FakeWorker {
    infeasible: Option<String>,
    never_passes: bool,
    /// Diagnostics for the first full-suite run after an implementation passed.
    lint_failure: Option<String>,
    implemented_runs: Mutex<u32>,
    queries: Mutex<Vec<String>>,
    commits: Mutex<Vec<String>>,
    constraints_seen: Mutex<Vec<Vec<String>>>,
}

impl FakeWorker {
    fn infeasible(reason: &str) -> Self {
        Self {
            infeasible: Some(reason.to_string()),
            ..Default::default()
        }
    }

    fn never_passes() -> Self {
        Self {
            never_passes: true,
            ..Default::default()
        }
    }

    fn fails_lint_once(diagnostics: &str) -> Self {
        Self {
            lint_failure: Some(diagnostics.to_string()),
            ..Default::default()
        }
    }
}

#[async_trait]
impl Researcher for FakeWorker {
    async fn query(&self, topic: &str) -> CapabilityResult<Vec<Finding>> {
        self.queries.lock().unwrap().push(topic.to_string());
        Ok(Vec::new())
    }
}

#[async_trait]
impl Specifier for FakeWorker {
    async fn produce_spec(
        &self,
        description: &str,
        _context: &str,
    ) -> CapabilityResult<SpecOutcome> {
        if let Some(reason) = &self.infeasible {
            return Ok(SpecOutcome::Infeasible {
                reason: reason.clone(),
            });
        }
        Ok(SpecOutcome::Spec(Spec {
            path: PathBuf::from("specs/feature.md"),
            criteria: vec![format!("{} works", description.lines().next().unwrap_or(""))],
            summary: String::new(),
        }))
    }
}

#[async_trait]
impl TestWriter for FakeWorker {
    async fn write_test(&self, _spec: &Spec, target: &str) -> CapabilityResult<TestArtifactRef> {
        Ok(TestArtifactRef {
            path: PathBuf::from("tests/feature_test.rs"),
            name: target.to_string(),
        })
    }
}

#[async_trait]
impl Implementer for FakeWorker {
    async fn write_implementation(
        &self,
        _test: &TestArtifactRef,
        constraints: &[String],
    ) -> CapabilityResult<ImplArtifactRef> {
        self.constraints_seen
            .lock()
            .unwrap()
            .push(constraints.to_vec());
        Ok(ImplArtifactRef {
            path: PathBuf::from("src/feature.rs"),
        })
    }
}

#[async_trait]
impl Validator for FakeWorker {
    async fn run_validation(&self, paths: &[PathBuf]) -> CapabilityResult<ValidationResult> {
        let implemented = paths.iter().any(|p| p.starts_with("src"));
        if implemented {
            let mut runs = self.implemented_runs.lock().unwrap();
            *runs += 1;
            if *runs == 2
                && let Some(diagnostics) = &self.lint_failure
            {
                return Ok(ValidationResult {
                    passed: false,
                    diagnostics: diagnostics.clone(),
                });
            }
        }
        if implemented && !self.never_passes {
            Ok(ValidationResult {
                passed: true,
                diagnostics: String::new(),
            })
        } else {
            Ok(ValidationResult {
                passed: false,
                diagnostics: "error[E0425]: cannot find function `feature`".to_string(),
            })
        }
    }
}

#[async_trait]
impl Refactorer for FakeWorker {
    async fn propose_refactors(&self, _paths: &[PathBuf]) -> CapabilityResult<Vec<Suggestion>> {
        Ok(vec![Suggestion {
            description: "extract helper".to_string(),
            paths: vec![PathBuf::from("src/feature.rs")],
        }])
    }

    async fn apply_refactor(&self, _suggestion: &Suggestion) -> CapabilityResult<RefactorResult> {
        Ok(RefactorResult {
            applied: true,
            summary: String::new(),
        })
    }
}

#[async_trait]
impl Committer for FakeWorker {
    async fn finalize(&self, task: &Task) -> CapabilityResult<CommitRef> {
        self.commits.lock().unwrap().push(task.title.clone());
        Ok(CommitRef {
            id: "abc123".to_string(),
            message: task.title.clone(),
        })
    }
}

struct FixedProbe(f64);

#[async_trait]
impl CoverageProbe for FixedProbe {
    async fn measure(&self, _task: &Task) -> CapabilityResult<Option<f64>> {
        Ok(Some(self.0))
    }
}

struct FailingImplementer;

#[async_trait]
impl Implementer for FailingImplementer {
    async fn write_implementation(
        &self,
        _test: &TestArtifactRef,
        _constraints: &[String],
    ) -> CapabilityResult<ImplArtifactRef> {
        Err(CapabilityError::NonZeroExit { exit_code: 1 })
    }
}

fn setup() -> (TempDir, Config) {
    let dir = TempDir::new().unwrap();
    init_project(dir.path()).unwrap();
    let config = Config::new(dir.path().to_path_buf(), false).unwrap();
    config.ensure_directories().unwrap();
    (dir, config)
}

fn new_orchestrator(config: &Config, worker: FakeWorker) -> Orchestrator {
    Orchestrator::new(config, Workers::uniform(Arc::new(worker)))
}

fn item(title: &str) -> BacklogItem {
    BacklogItem::new(
        title,
        "",
        Priority::High,
        Complexity::Small,
        SignalSource::Manual,
    )
}

fn state_with(title: &str) -> (OrchestratorState, String) {
    let mut state = OrchestratorState::new();
    let item = item(title);
    let id = item.id.clone();
    state.backlog.insert(item);
    (state, id)
}

async fn tick_n(
    orchestrator: &Orchestrator,
    state: &mut OrchestratorState,
    n: usize,
) -> Vec<TickOutcome> {
    let mut outcomes = Vec::new();
    for _ in 0..n {
        outcomes.push(orchestrator.tick(state).await.unwrap());
    }
    outcomes
}

#[tokio::test]
async fn test_empty_backlog_triggers_discovery() {
    let (_dir, config) = setup();
    let orchestrator = new_orchestrator(&config, FakeWorker::default());
    let mut state = OrchestratorState::new();

    let outcome = orchestrator.tick(&mut state).await.unwrap();

    match outcome {
        TickOutcome::Discovered { added, .. } => assert!(added >= 1),
        other => panic!("expected discovery, got {:?}", other),
    }
    assert!(state.backlog.has_pending());
    assert!(state.stats.discovered >= 1);
    assert!(state.active_task.is_none());
    assert_eq!(state.breakers.empty_backlog_ticks, 0);
}

#[tokio::test]
async fn test_happy_path_completes_task() {
    let (_dir, config) = setup();
    let worker = Arc::new(FakeWorker::default());
    let orchestrator = Orchestrator::new(&config, Workers::uniform(worker.clone()));
    let (mut state, item_id) = state_with("Export CSV");

    let outcomes = tick_n(&orchestrator, &mut state, 6).await;

    assert!(matches!(outcomes[0], TickOutcome::Promoted { .. }));
    assert!(matches!(
        outcomes[2],
        TickOutcome::Advanced {
            from: Phase::Red,
            to: Phase::Green,
            ..
        }
    ));
    assert!(matches!(outcomes[5], TickOutcome::Completed { .. }));
    assert!(state.active_task.is_none());
    assert_eq!(state.backlog.get(&item_id).unwrap().status, ItemStatus::Done);
    assert_eq!(state.stats.completed, 1);
    assert_eq!(state.breakers.iterations, 1);
    assert_eq!(worker.commits.lock().unwrap().as_slice(), ["Export CSV"]);

    let audit = AuditLogger::new(&config.audit_dir);
    let archives = audit.list_archives().unwrap();
    assert_eq!(archives.len(), 1);
    let archive = audit.load_archive(&archives[0]).unwrap();
    assert_eq!(archive.task.phase, Phase::Complete);
    assert_eq!(archive.commit.unwrap().id, "abc123");

    let dispatches = audit.read_dispatches().unwrap();
    assert_eq!(dispatches.len(), 5);
    assert!(
        dispatches
            .iter()
            .all(|d| d.decision == DispatchDecision::Dispatched)
    );
}

#[tokio::test]
async fn test_unselected_task_in_snapshot_moves_to_specify() {
    let (_dir, config) = setup();
    let worker = Arc::new(FakeWorker::default());
    let orchestrator = Orchestrator::new(&config, Workers::uniform(worker.clone()));
    let (mut state, item_id) = state_with("Export CSV");
    let task = Task::from_item(state.backlog.get(&item_id).unwrap());
    state.backlog.mark_in_progress(&item_id).unwrap();
    state.active_task = Some(task);

    let outcome = orchestrator.tick(&mut state).await.unwrap();

    assert!(matches!(
        outcome,
        TickOutcome::Advanced {
            from: Phase::Discovery,
            to: Phase::Specify,
            ..
        }
    ));
    assert!(worker.queries.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_infeasible_spec_blocks_and_frees_slot() {
    let (_dir, config) = setup();
    let worker = Arc::new(FakeWorker::infeasible("missing dependency X"));
    let orchestrator = Orchestrator::new(&config, Workers::uniform(worker.clone()));
    let (mut state, item_id) = state_with("Export CSV");

    let outcomes = tick_n(&orchestrator, &mut state, 2).await;

    match &outcomes[1] {
        TickOutcome::Blocked { reason, .. } => assert_eq!(reason, "missing dependency X"),
        other => panic!("expected blocked, got {:?}", other),
    }
    let item = state.backlog.get(&item_id).unwrap();
    assert_eq!(item.status.to_string(), "blocked: missing dependency X");
    assert_eq!(item.priority, Priority::Medium);
    assert!(state.active_task.is_none());
    assert_eq!(state.stats.blocked, 1);
    assert!(
        worker
            .queries
            .lock()
            .unwrap()
            .iter()
            .any(|q| q.contains("missing dependency X"))
    );
}

#[tokio::test]
async fn test_validation_diagnostics_reach_implementer_retry() {
    let (_dir, config) = setup();
    let worker = Arc::new(FakeWorker::fails_lint_once(
        "clippy: unused import `std::fmt` in src/feature.rs",
    ));
    let orchestrator = Orchestrator::new(&config, Workers::uniform(worker.clone()));
    let (mut state, _) = state_with("Export CSV");

    // promote, specify, red, green, validate (fails), green again
    let outcomes = tick_n(&orchestrator, &mut state, 6).await;

    assert!(matches!(
        outcomes[4],
        TickOutcome::Advanced {
            from: Phase::Validate,
            to: Phase::Green,
            ..
        }
    ));
    let seen = worker.constraints_seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert!(!seen[0].iter().any(|c| c.contains("unused import")));
    assert!(
        seen[1]
            .iter()
            .any(|c| c.contains("clippy: unused import `std::fmt`"))
    );
}

#[tokio::test]
async fn test_repeated_failures_escalate_to_blocked() {
    let (_dir, config) = setup();
    let orchestrator = new_orchestrator(&config, FakeWorker::never_passes());
    let (mut state, item_id) = state_with("Export CSV");

    // promote, specify, red
    let outcomes = tick_n(&orchestrator, &mut state, 3).await;
    assert!(matches!(
        outcomes[2],
        TickOutcome::Advanced {
            to: Phase::Green,
            ..
        }
    ));

    let retries = tick_n(&orchestrator, &mut state, 4).await;
    for outcome in &retries {
        assert!(matches!(
            outcome,
            TickOutcome::Advanced {
                from: Phase::Green,
                to: Phase::Green,
                ..
            }
        ));
    }
    let task_id = state.active_task.as_ref().unwrap().id.clone();
    assert_eq!(state.breakers.failure_count(&task_id, Phase::Green), 4);

    let fifth = orchestrator.tick(&mut state).await.unwrap();
    match fifth {
        TickOutcome::Blocked { reason, .. } => {
            assert!(reason.starts_with("stuck in green after 5 consecutive failures"));
        }
        other => panic!("expected blocked, got {:?}", other),
    }
    assert!(matches!(
        state.backlog.get(&item_id).unwrap().status,
        ItemStatus::Blocked { .. }
    ));
    assert_eq!(state.breakers.failure_count(&task_id, Phase::Green), 0);
}

#[tokio::test]
async fn test_capability_error_counts_as_failure() {
    let (_dir, config) = setup();
    let mut workers = Workers::uniform(Arc::new(FakeWorker::default()));
    workers.implementer = Arc::new(FailingImplementer);
    let orchestrator = Orchestrator::new(&config, workers);
    let (mut state, _) = state_with("Export CSV");

    let outcomes = tick_n(&orchestrator, &mut state, 4).await;

    assert!(matches!(
        outcomes[3],
        TickOutcome::Advanced {
            from: Phase::Green,
            to: Phase::Green,
            ..
        }
    ));
    let task = state.active_task.as_ref().unwrap();
    assert!(task.last_diagnostics.as_deref().unwrap().contains("non-zero"));
    assert_eq!(state.breakers.failure_count(&task.id, Phase::Green), 1);
}

#[tokio::test]
async fn test_stop_signal_aborts_and_is_cleared() {
    let (_dir, config) = setup();
    let orchestrator = new_orchestrator(&config, FakeWorker::default());
    let (mut state, _) = state_with("Export CSV");
    let signal = StopSignal::new(&config.stop_file);
    signal.raise().unwrap();

    let mut seen = Vec::new();
    let summary = orchestrator
        .run(&mut state, Some(10), |outcome, _| seen.push(outcome.clone()))
        .await
        .unwrap();

    assert_eq!(
        summary.outcome,
        RunOutcome::Aborted {
            reason: AbortReason::StopRequested
        }
    );
    assert_eq!(summary.ticks, 1);
    assert_eq!(seen.len(), 1);
    assert!(!signal.is_raised());
    assert!(!state.breakers.stop_requested);
    assert!(state.active_task.is_none());
    assert!(config.state_file.exists());
}

#[tokio::test]
async fn test_iteration_cap_pauses_run() {
    let (_dir, config) = setup();
    let orchestrator = Orchestrator::new(
        &config,
        Workers::uniform(Arc::new(FakeWorker::infeasible("needs a design"))),
    )
    .with_breaker_config(BreakerConfig {
        max_iterations: 1,
        ..BreakerConfig::default()
    });
    let (mut state, _) = state_with("Export CSV");

    let summary = orchestrator
        .run(&mut state, Some(10), |_, _| {})
        .await
        .unwrap();

    assert_eq!(
        summary.outcome,
        RunOutcome::Paused {
            reason: PauseReason::IterationCap {
                iterations: 1,
                cap: 1
            }
        }
    );
    assert_eq!(summary.ticks, 3);
    assert_eq!(summary.blocked, 1);
}

#[tokio::test]
async fn test_tick_limit_ends_run() {
    let (_dir, config) = setup();
    let orchestrator = new_orchestrator(&config, FakeWorker::default());
    let (mut state, _) = state_with("Export CSV");

    let summary = orchestrator
        .run(&mut state, Some(2), |_, _| {})
        .await
        .unwrap();

    assert_eq!(summary.outcome, RunOutcome::TickLimit { max_ticks: 2 });
    assert_eq!(summary.active_task.unwrap().phase, Phase::Red);
}

#[tokio::test]
async fn test_rate_limit_holds_dispatch() {
    let (_dir, config) = setup();
    let orchestrator = new_orchestrator(&config, FakeWorker::default())
        .with_rate_limiter(RateLimiter {
            max_per_minute: 1,
            max_per_hour: 0,
        });
    let (mut state, _) = state_with("Export CSV");

    let outcomes = tick_n(&orchestrator, &mut state, 3).await;

    assert!(matches!(outcomes[1], TickOutcome::Advanced { .. }));
    assert!(matches!(outcomes[2], TickOutcome::Throttled { .. }));
    assert_eq!(state.active_task.as_ref().unwrap().phase, Phase::Red);

    let dispatches = AuditLogger::new(&config.audit_dir).read_dispatches().unwrap();
    assert_eq!(dispatches.len(), 2);
    assert_eq!(dispatches[1].decision, DispatchDecision::Throttled);
}

#[tokio::test]
async fn test_inbox_items_join_backlog_on_tick() {
    let (_dir, config) = setup();
    let orchestrator = new_orchestrator(&config, FakeWorker::default());
    let inbox = Inbox::new(&config.inbox_file);
    inbox.push(&item("Import CSV")).unwrap();
    let mut state = OrchestratorState::new();

    let outcome = orchestrator.tick(&mut state).await.unwrap();

    match outcome {
        TickOutcome::Promoted { title, .. } => assert_eq!(title, "Import CSV"),
        other => panic!("expected promotion, got {:?}", other),
    }
    assert_eq!(state.backlog.len(), 1);
    // held until a snapshot containing it is saved
    assert_eq!(inbox.peek().unwrap().len(), 1);

    orchestrator
        .run(&mut state, Some(1), |_, _| {})
        .await
        .unwrap();
    assert!(inbox.peek().unwrap().is_empty());
    assert_eq!(state.backlog.len(), 1);
}

#[tokio::test]
async fn test_inbox_items_survive_an_unsaved_tick() {
    let (_dir, config) = setup();
    let inbox = Inbox::new(&config.inbox_file);
    inbox.push(&item("Import CSV")).unwrap();

    // the process dies after the tick, before any snapshot is written
    let crashed = new_orchestrator(&config, FakeWorker::default());
    crashed.tick(&mut OrchestratorState::new()).await.unwrap();

    let resumed = new_orchestrator(&config, FakeWorker::default());
    let mut state = resumed.store().load_or_recover().unwrap();
    assert!(state.backlog.is_empty());
    let outcome = resumed.tick(&mut state).await.unwrap();
    match outcome {
        TickOutcome::Promoted { title, .. } => assert_eq!(title, "Import CSV"),
        other => panic!("expected promotion, got {:?}", other),
    }
}

#[tokio::test]
async fn test_coverage_gap_adds_critical_item() {
    let (_dir, config) = setup();
    let workers = Workers::uniform(Arc::new(FakeWorker::default()))
        .with_probe(CoverageCategory::Unit, Arc::new(FixedProbe(40.0)));
    let orchestrator = Orchestrator::new(&config, workers);
    let (mut state, _) = state_with("Export CSV");

    // promote, specify, red, green, validate
    tick_n(&orchestrator, &mut state, 5).await;

    assert_eq!(state.active_task.as_ref().unwrap().phase, Phase::Refactor);
    let coverage = state.last_coverage.as_ref().unwrap();
    assert!(!coverage.all_pass);
    let gaps: Vec<&BacklogItem> = state
        .backlog
        .items()
        .iter()
        .filter(|i| i.source == SignalSource::Coverage)
        .collect();
    assert_eq!(gaps.len(), 1);
    assert_eq!(gaps[0].priority, Priority::Critical);
    assert!(gaps[0].status.is_pending());
}

#[tokio::test]
async fn test_persistent_coverage_gap_reuses_one_item() {
    let (_dir, config) = setup();
    let workers = Workers::uniform(Arc::new(FakeWorker::default()))
        .with_probe(CoverageCategory::EndToEnd, Arc::new(FixedProbe(40.0)));
    let orchestrator = Orchestrator::new(&config, workers);
    let (mut state, _) = state_with("Export CSV");
    let coverage_items = |state: &OrchestratorState| -> Vec<BacklogItem> {
        state
            .backlog
            .items()
            .iter()
            .filter(|i| i.source == SignalSource::Coverage)
            .cloned()
            .collect()
    };

    // the feature task completes and reports the gap
    tick_n(&orchestrator, &mut state, 6).await;
    let gaps = coverage_items(&state);
    assert_eq!(gaps.len(), 1);
    assert_eq!(gaps[0].title, "Raise end-to-end coverage to 100%");
    let gap_id = gaps[0].id.clone();

    // the gap task runs next and does not spawn a copy of itself
    let outcomes = tick_n(&orchestrator, &mut state, 6).await;
    match &outcomes[0] {
        TickOutcome::Promoted { title, .. } => {
            assert_eq!(title, "Raise end-to-end coverage to 100%")
        }
        other => panic!("expected the gap item to be promoted, got {:?}", other),
    }
    assert!(matches!(outcomes[5], TickOutcome::Completed { .. }));
    assert_eq!(coverage_items(&state).len(), 1);
    assert_eq!(state.backlog.get(&gap_id).unwrap().status, ItemStatus::Done);

    // a later task that still sees the gap re-opens the same item
    state.backlog.insert(item("Import CSV"));
    tick_n(&orchestrator, &mut state, 5).await;
    assert_eq!(coverage_items(&state).len(), 1);
    assert!(state.backlog.get(&gap_id).unwrap().status.is_pending());
}

#[tokio::test]
async fn test_state_survives_restart() {
    let (_dir, config) = setup();
    let orchestrator = new_orchestrator(&config, FakeWorker::default());
    let (mut state, _) = state_with("Export CSV");
    orchestrator
        .run(&mut state, Some(3), |_, _| {})
        .await
        .unwrap();

    let resumed = new_orchestrator(&config, FakeWorker::default());
    let mut restored = resumed.store().load_or_recover().unwrap();
    assert_eq!(restored.active_task.as_ref().unwrap().phase, Phase::Green);
    assert_eq!(restored.stats.ticks, 3);

    let outcome = resumed.tick(&mut restored).await.unwrap();
    assert!(matches!(
        outcome,
        TickOutcome::Advanced {
            from: Phase::Green,
            to: Phase::Validate,
            ..
        }
    ));
}
