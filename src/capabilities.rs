//! Contracts for the external workers the orchestrator delegates to.
//!
//! Every capability is an `async_trait` so it can be backed by a child
//! process ([`crate::worker::CommandWorker`]) or by an in-memory double in
//! tests. Failures are [`CapabilityError`] values; a worker never panics the
//! loop.

use crate::coverage::CoverageCategory;
use crate::discovery::{DiscoverySignal, Finding, ScanContext};
use crate::errors::CapabilityError;
use crate::task::{ImplArtifactRef, Spec, Task, TestArtifactRef};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

pub type CapabilityResult<T> = Result<T, CapabilityError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum SpecOutcome {
    Spec(Spec),
    Infeasible { reason: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub passed: bool,
    #[serde(default)]
    pub diagnostics: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    pub description: String,
    #[serde(default)]
    pub paths: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefactorResult {
    pub applied: bool,
    #[serde(default)]
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRef {
    pub id: String,
    #[serde(default)]
    pub message: String,
}

#[async_trait]
pub trait Researcher: Send + Sync {
    async fn query(&self, topic: &str) -> CapabilityResult<Vec<Finding>>;
}

#[async_trait]
pub trait Specifier: Send + Sync {
    async fn produce_spec(&self, description: &str, context: &str)
    -> CapabilityResult<SpecOutcome>;
}

#[async_trait]
pub trait TestWriter: Send + Sync {
    async fn write_test(&self, spec: &Spec, target: &str) -> CapabilityResult<TestArtifactRef>;
}

#[async_trait]
pub trait Implementer: Send + Sync {
    async fn write_implementation(
        &self,
        test: &TestArtifactRef,
        constraints: &[String],
    ) -> CapabilityResult<ImplArtifactRef>;
}

#[async_trait]
pub trait Validator: Send + Sync {
    async fn run_validation(&self, paths: &[PathBuf]) -> CapabilityResult<ValidationResult>;
}

#[async_trait]
pub trait Refactorer: Send + Sync {
    async fn propose_refactors(&self, paths: &[PathBuf]) -> CapabilityResult<Vec<Suggestion>>;
    async fn apply_refactor(&self, suggestion: &Suggestion) -> CapabilityResult<RefactorResult>;
}

#[async_trait]
pub trait Committer: Send + Sync {
    async fn finalize(&self, task: &Task) -> CapabilityResult<CommitRef>;
}

#[async_trait]
pub trait DiscoveryScanner: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;
    async fn scan(&self, context: &ScanContext) -> CapabilityResult<Vec<DiscoverySignal>>;
}

#[async_trait]
pub trait CoverageProbe: Send + Sync {
    /// Percentage for this probe's category, `None` when unmeasurable.
    async fn measure(&self, task: &Task) -> CapabilityResult<Option<f64>>;
}

/// The full set of workers an orchestrator drives.
#[derive(Clone)]
pub struct Workers {
    pub researcher: Arc<dyn Researcher>,
    pub specifier: Arc<dyn Specifier>,
    pub test_writer: Arc<dyn TestWriter>,
    pub implementer: Arc<dyn Implementer>,
    pub validator: Arc<dyn Validator>,
    pub refactorer: Arc<dyn Refactorer>,
    pub committer: Arc<dyn Committer>,
    pub scanners: Vec<Arc<dyn DiscoveryScanner>>,
    pub probes: BTreeMap<CoverageCategory, Arc<dyn CoverageProbe>>,
}

impl Workers {
    /// Use one value for every single-role capability.
    pub fn uniform<W>(worker: Arc<W>) -> Self
    where
        W: Researcher
            + Specifier
            + TestWriter
            + Implementer
            + Validator
            + Refactorer
            + Committer
            + 'static,
    {
        Self {
            researcher: worker.clone(),
            specifier: worker.clone(),
            test_writer: worker.clone(),
            implementer: worker.clone(),
            validator: worker.clone(),
            refactorer: worker.clone(),
            committer: worker,
            scanners: Vec::new(),
            probes: BTreeMap::new(),
        }
    }

    pub fn with_scanner(mut self, scanner: Arc<dyn DiscoveryScanner>) -> Self {
        self.scanners.push(scanner);
        self
    }

    pub fn with_probe(mut self, category: CoverageCategory, probe: Arc<dyn CoverageProbe>) -> Self {
        self.probes.insert(category, probe);
        self
    }
}
