//! Subprocess-backed capabilities.
//!
//! [`CommandWorker`] fills every role by piping a rendered prompt to a shell
//! command (`claude --print` by default) and reading a JSON object back from
//! stdout. [`CommandScanner`] and [`CommandProbe`] wrap plain shell tools for
//! discovery and coverage.

use crate::backlog::{Complexity, Priority, SignalSource};
use crate::capabilities::{
    CapabilityResult, CommitRef, Committer, CoverageProbe, DiscoveryScanner, Implementer,
    RefactorResult, Refactorer, Researcher, SpecOutcome, Specifier, Suggestion, TestWriter,
    ValidationResult, Validator, Workers,
};
use crate::config::Config;
use crate::coverage::CoverageCategory;
use crate::discovery::{DiscoverySignal, Finding, ScanContext};
use crate::dispatch::Capability;
use crate::errors::CapabilityError;
use crate::task::{ImplArtifactRef, Spec, Task, TestArtifactRef};
use crate::util::extract_json_object;
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;

static PERCENT_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+(?:\.\d+)?)\s*%").unwrap());

/// Run `sh -c <command>` in `dir`, optionally feeding `input` on stdin.
async fn run_shell(
    command: &str,
    dir: &Path,
    input: Option<&str>,
    envs: &[(&str, String)],
    limit: Duration,
) -> CapabilityResult<Output> {
    let mut child = Command::new("sh")
        .arg("-c")
        .arg(command)
        .current_dir(dir)
        .envs(envs.iter().map(|(k, v)| (*k, v.as_str())))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| CapabilityError::SpawnFailed {
            command: command.to_string(),
            source,
        })?;

    // The prompt write counts against the limit.
    let stdin = child.stdin.take();
    let exchange = async move {
        // Dropping stdin closes the pipe so the child sees EOF.
        if let Some(mut stdin) = stdin
            && let Some(input) = input
        {
            if let Err(e) = stdin.write_all(input.as_bytes()).await
                && e.kind() != std::io::ErrorKind::BrokenPipe
            {
                return Err(e);
            }
        }
        child.wait_with_output().await
    };

    match timeout(limit, exchange).await {
        Ok(result) => result.map_err(|e| CapabilityError::Other(e.into())),
        Err(_) => Err(CapabilityError::Timeout {
            secs: limit.as_secs(),
        }),
    }
}

/// Pull the first JSON object out of worker output and decode it.
pub fn parse_response<T: DeserializeOwned>(stdout: &str) -> CapabilityResult<T> {
    let json = extract_json_object(stdout).ok_or_else(|| {
        CapabilityError::MalformedResponse("no JSON object in worker output".to_string())
    })?;
    serde_json::from_str(json).map_err(|e| CapabilityError::MalformedResponse(e.to_string()))
}

/// The last percentage printed by a coverage tool, clamped to 0..=100.
pub fn parse_percentage(output: &str) -> Option<f64> {
    PERCENT_REGEX
        .captures_iter(output)
        .last()
        .and_then(|caps| caps[1].parse::<f64>().ok())
        .map(|p| p.clamp(0.0, 100.0))
}

#[derive(Deserialize)]
struct FindingsResponse {
    #[serde(default)]
    findings: Vec<Finding>,
}

#[derive(Deserialize)]
struct SuggestionsResponse {
    #[serde(default)]
    suggestions: Vec<Suggestion>,
}

fn join_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

/// A worker that delegates every role to one shell command.
pub struct CommandWorker {
    command: String,
    project_dir: PathBuf,
    timeout: Duration,
    validate_command: Option<String>,
}

impl CommandWorker {
    pub fn new(command: impl Into<String>, project_dir: impl AsRef<Path>) -> Self {
        Self {
            command: command.into(),
            project_dir: project_dir.as_ref().to_path_buf(),
            timeout: Duration::from_secs(900),
            validate_command: None,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let worker = &config.toml().worker;
        Self::new(config.worker_cmd.clone(), &config.project_dir)
            .with_timeout(Duration::from_secs(worker.timeout_secs))
            .with_validate_command(worker.validate_command.clone())
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_validate_command(mut self, command: Option<String>) -> Self {
        self.validate_command = command;
        self
    }

    fn render_prompt(&self, role: Capability, task: &str, reply: &str) -> String {
        format!(
            r#"You are acting as the {role} for the project in {dir}.

## TASK
{task}

## RESPONSE
Reply with a single JSON object and nothing else:
{reply}
"#,
            role = role,
            dir = self.project_dir.display(),
            task = task,
            reply = reply,
        )
    }

    async fn invoke<T: DeserializeOwned>(
        &self,
        role: Capability,
        task: &str,
        reply: &str,
    ) -> CapabilityResult<T> {
        let prompt = self.render_prompt(role, task, reply);
        tracing::debug!(%role, chars = prompt.len(), "invoking worker");

        let output = run_shell(
            &self.command,
            &self.project_dir,
            Some(&prompt),
            &[("LOOPSMITH_ROLE", role.to_string())],
            self.timeout,
        )
        .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::warn!(%role, stderr = %stderr.trim(), "worker exited with failure");
            return Err(CapabilityError::NonZeroExit {
                exit_code: output.status.code().unwrap_or(-1),
            });
        }

        parse_response(&String::from_utf8_lossy(&output.stdout))
    }
}

#[async_trait]
impl Researcher for CommandWorker {
    async fn query(&self, topic: &str) -> CapabilityResult<Vec<Finding>> {
        let response: FindingsResponse = self
            .invoke(
                Capability::Researcher,
                &format!("Investigate the following and list concrete work items:\n{topic}"),
                r#"{"findings": [{"title": "...", "detail": "...", "priority": "high|medium|low", "complexity": "trivial|small|medium|large"}]}"#,
            )
            .await?;
        Ok(response.findings)
    }
}

#[async_trait]
impl Specifier for CommandWorker {
    async fn produce_spec(
        &self,
        description: &str,
        context: &str,
    ) -> CapabilityResult<SpecOutcome> {
        self.invoke(
            Capability::Specifier,
            &format!(
                "Write a specification file with testable acceptance criteria.\n\n{description}\n\n## CONTEXT\n{context}"
            ),
            r#"{"outcome": "spec", "path": "docs/spec.md", "criteria": ["..."], "summary": "..."} or {"outcome": "infeasible", "reason": "..."}"#,
        )
        .await
    }
}

#[async_trait]
impl TestWriter for CommandWorker {
    async fn write_test(&self, spec: &Spec, target: &str) -> CapabilityResult<TestArtifactRef> {
        self.invoke(
            Capability::TestWriter,
            &format!(
                "Write one failing test for this criterion of {}:\n{target}",
                spec.path.display()
            ),
            r#"{"path": "tests/...", "name": "..."}"#,
        )
        .await
    }
}

#[async_trait]
impl Implementer for CommandWorker {
    async fn write_implementation(
        &self,
        test: &TestArtifactRef,
        constraints: &[String],
    ) -> CapabilityResult<ImplArtifactRef> {
        let mut task = format!(
            "Write the minimal implementation that makes the test {} in {} pass.",
            test.name,
            test.path.display()
        );
        if !constraints.is_empty() {
            task.push_str("\n\n## CONSTRAINTS\n");
            for constraint in constraints {
                task.push_str(&format!("- {constraint}\n"));
            }
        }
        self.invoke(Capability::Implementer, &task, r#"{"path": "src/..."}"#)
            .await
    }
}

#[async_trait]
impl Validator for CommandWorker {
    async fn run_validation(&self, paths: &[PathBuf]) -> CapabilityResult<ValidationResult> {
        let Some(command) = &self.validate_command else {
            return self
                .invoke(
                    Capability::Validator,
                    &format!("Run the test suite covering these files:\n{}", join_paths(paths)),
                    r#"{"passed": true, "diagnostics": "..."}"#,
                )
                .await;
        };

        let output = run_shell(
            command,
            &self.project_dir,
            None,
            &[("LOOPSMITH_PATHS", join_paths(paths))],
            self.timeout,
        )
        .await?;

        let mut diagnostics = String::from_utf8_lossy(&output.stdout).into_owned();
        diagnostics.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(ValidationResult {
            passed: output.status.success(),
            diagnostics: diagnostics.trim().to_string(),
        })
    }
}

#[async_trait]
impl Refactorer for CommandWorker {
    async fn propose_refactors(&self, paths: &[PathBuf]) -> CapabilityResult<Vec<Suggestion>> {
        let response: SuggestionsResponse = self
            .invoke(
                Capability::Refactorer,
                &format!(
                    "Propose behavior-preserving refactors for these files. Do not edit yet.\n{}",
                    join_paths(paths)
                ),
                r#"{"suggestions": [{"description": "...", "paths": ["..."]}]}"#,
            )
            .await?;
        Ok(response.suggestions)
    }

    async fn apply_refactor(&self, suggestion: &Suggestion) -> CapabilityResult<RefactorResult> {
        self.invoke(
            Capability::Refactorer,
            &format!(
                "Apply this refactor and keep every test passing:\n{}\n\nFiles:\n{}",
                suggestion.description,
                join_paths(&suggestion.paths)
            ),
            r#"{"applied": true, "summary": "..."}"#,
        )
        .await
    }
}

#[async_trait]
impl Committer for CommandWorker {
    async fn finalize(&self, task: &Task) -> CapabilityResult<CommitRef> {
        self.invoke(
            Capability::Committer,
            &format!(
                "Commit the finished work for \"{}\".\n\nFiles:\n{}",
                task.title,
                join_paths(&task.artifacts.paths())
            ),
            r#"{"id": "<commit sha>", "message": "..."}"#,
        )
        .await
    }
}

/// A discovery scanner backed by a shell tool; each stdout line is a finding.
pub struct CommandScanner {
    name: String,
    source: SignalSource,
    command: String,
    priority: Priority,
    complexity: Complexity,
    timeout: Duration,
}

impl CommandScanner {
    pub fn new(name: impl Into<String>, source: SignalSource, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source,
            command: command.into(),
            priority: Priority::default(),
            complexity: Complexity::default(),
            timeout: Duration::from_secs(300),
        }
    }

    pub fn with_priority(mut self, priority: Priority, complexity: Complexity) -> Self {
        self.priority = priority;
        self.complexity = complexity;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl DiscoveryScanner for CommandScanner {
    fn name(&self) -> &str {
        &self.name
    }

    async fn scan(&self, context: &ScanContext) -> CapabilityResult<Vec<DiscoverySignal>> {
        let output = run_shell(
            &self.command,
            &context.project_dir,
            None,
            &[("LOOPSMITH_GENERATION", context.generation.to_string())],
            self.timeout,
        )
        .await?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let signals: Vec<DiscoverySignal> = stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| DiscoverySignal {
                source: self.source,
                finding: line.to_string(),
                detail: format!("reported by {}", self.name),
                proposed: self.priority,
                complexity: self.complexity,
            })
            .collect();

        // Linters exit non-zero when they find something; only silence is a failure.
        if signals.is_empty() && !output.status.success() {
            return Err(CapabilityError::NonZeroExit {
                exit_code: output.status.code().unwrap_or(-1),
            });
        }
        Ok(signals)
    }
}

/// A coverage probe that runs a tool and reads the last percentage it prints.
pub struct CommandProbe {
    category: CoverageCategory,
    command: String,
    project_dir: PathBuf,
    timeout: Duration,
}

impl CommandProbe {
    pub fn new(
        category: CoverageCategory,
        command: impl Into<String>,
        project_dir: impl AsRef<Path>,
    ) -> Self {
        Self {
            category,
            command: command.into(),
            project_dir: project_dir.as_ref().to_path_buf(),
            timeout: Duration::from_secs(900),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl CoverageProbe for CommandProbe {
    async fn measure(&self, task: &Task) -> CapabilityResult<Option<f64>> {
        let output = run_shell(
            &self.command,
            &self.project_dir,
            None,
            &[
                ("LOOPSMITH_TASK_ID", task.id.clone()),
                ("LOOPSMITH_CATEGORY", self.category.to_string()),
            ],
            self.timeout,
        )
        .await?;

        if !output.status.success() {
            return Err(CapabilityError::NonZeroExit {
                exit_code: output.status.code().unwrap_or(-1),
            });
        }
        Ok(parse_percentage(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// Build the worker set described by the configuration.
pub fn workers_from_config(config: &Config) -> Workers {
    let toml = config.toml();
    let worker_timeout = Duration::from_secs(toml.worker.timeout_secs);
    let mut workers = Workers::uniform(Arc::new(CommandWorker::from_config(config)));

    for scanner in &toml.discovery.scanners {
        workers = workers.with_scanner(Arc::new(
            CommandScanner::new(&scanner.name, scanner.source, &scanner.command)
                .with_priority(scanner.priority, scanner.complexity)
                .with_timeout(worker_timeout),
        ));
    }

    for (category, command) in toml.coverage.probe_commands() {
        workers = workers.with_probe(
            category,
            Arc::new(
                CommandProbe::new(category, command, &config.project_dir)
                    .with_timeout(worker_timeout),
            ),
        );
    }

    workers
}
