//! Configuration file for loopsmith.
//!
//! Reads `.loopsmith/loopsmith.toml`. Every field has a default, so a missing
//! file or an empty section behaves like the defaults below.
//!
//! # Configuration File Format
//!
//! ```toml
//! [project]
//! name = "my-project"
//!
//! [breakers]
//! max_iterations = 100        # 0 disables the cap
//! max_wall_clock_minutes = 480 # 0 disables the limit
//! stuck_threshold = 5
//! empty_backlog_limit = 3
//! max_load_average = 8.0
//!
//! [lifecycle]
//! validation_retries = 3
//!
//! [coverage]
//! unit = 100.0
//! behavioral = 100.0
//! end_to_end = 100.0
//! mutation = 100.0
//!
//! [coverage.probes]
//! unit = "cargo llvm-cov --summary-only"
//!
//! [discovery]
//! allow_exhaustion = false
//! research_topic = "improvements users would notice"
//!
//! [[discovery.scanners]]
//! name = "audit"
//! source = "security"
//! command = "cargo audit --quiet"
//!
//! [dispatch]
//! max_per_minute = 30
//! max_per_hour = 500
//!
//! [worker]
//! command = "claude --print"
//! timeout_secs = 900
//! validate_command = "cargo test"
//! ```

use crate::backlog::{Complexity, Priority, SignalSource};
use crate::breakers::BreakerConfig;
use crate::coverage::CoverageCategory;
use crate::dispatch::RateLimiter;
use crate::lifecycle::LifecycleLimits;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Environment variable overriding `worker.command`.
pub const WORKER_CMD_ENV: &str = "LOOPSMITH_WORKER_CMD";

/// Name of the configuration file inside `.loopsmith/`.
pub const CONFIG_FILE: &str = "loopsmith.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project name (optional, defaults to directory name)
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakersSection {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default = "default_max_wall_clock_minutes")]
    pub max_wall_clock_minutes: u64,
    #[serde(default = "default_stuck_threshold")]
    pub stuck_threshold: u32,
    #[serde(default = "default_empty_backlog_limit")]
    pub empty_backlog_limit: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_load_average: Option<f64>,
}

fn default_max_iterations() -> u32 {
    100
}

fn default_max_wall_clock_minutes() -> u64 {
    8 * 60
}

fn default_stuck_threshold() -> u32 {
    5
}

fn default_empty_backlog_limit() -> u32 {
    3
}

impl Default for BreakersSection {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            max_wall_clock_minutes: default_max_wall_clock_minutes(),
            stuck_threshold: default_stuck_threshold(),
            empty_backlog_limit: default_empty_backlog_limit(),
            max_load_average: None,
        }
    }
}

impl BreakersSection {
    pub fn to_breaker_config(&self) -> BreakerConfig {
        BreakerConfig {
            max_iterations: self.max_iterations,
            max_wall_clock_secs: self.max_wall_clock_minutes.saturating_mul(60),
            stuck_threshold: self.stuck_threshold,
            empty_backlog_limit: self.empty_backlog_limit,
            max_load_average: self.max_load_average,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleSection {
    #[serde(default = "default_validation_retries")]
    pub validation_retries: u32,
}

fn default_validation_retries() -> u32 {
    3
}

impl Default for LifecycleSection {
    fn default() -> Self {
        Self {
            validation_retries: default_validation_retries(),
        }
    }
}

impl LifecycleSection {
    pub fn to_limits(&self) -> LifecycleLimits {
        LifecycleLimits {
            validation_retries: self.validation_retries,
        }
    }
}

/// Probe commands per coverage category. Absent categories are not measured.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoverageProbes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub behavioral: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_to_end: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mutation: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoverageSection {
    #[serde(default = "default_threshold")]
    pub unit: f64,
    #[serde(default = "default_threshold")]
    pub behavioral: f64,
    #[serde(default = "default_threshold")]
    pub end_to_end: f64,
    #[serde(default = "default_threshold")]
    pub mutation: f64,
    #[serde(default)]
    pub probes: CoverageProbes,
}

fn default_threshold() -> f64 {
    100.0
}

impl Default for CoverageSection {
    fn default() -> Self {
        Self {
            unit: default_threshold(),
            behavioral: default_threshold(),
            end_to_end: default_threshold(),
            mutation: default_threshold(),
            probes: CoverageProbes::default(),
        }
    }
}

impl CoverageSection {
    pub fn thresholds(&self) -> BTreeMap<CoverageCategory, f64> {
        BTreeMap::from([
            (CoverageCategory::Unit, self.unit),
            (CoverageCategory::Behavioral, self.behavioral),
            (CoverageCategory::EndToEnd, self.end_to_end),
            (CoverageCategory::Mutation, self.mutation),
        ])
    }

    pub fn probe_commands(&self) -> BTreeMap<CoverageCategory, String> {
        [
            (CoverageCategory::Unit, &self.probes.unit),
            (CoverageCategory::Behavioral, &self.probes.behavioral),
            (CoverageCategory::EndToEnd, &self.probes.end_to_end),
            (CoverageCategory::Mutation, &self.probes.mutation),
        ]
        .into_iter()
        .filter_map(|(category, command)| command.clone().map(|c| (category, c)))
        .collect()
    }
}

/// An external scanner: one finding per non-empty stdout line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    pub name: String,
    pub source: SignalSource,
    pub command: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub complexity: Complexity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoverySection {
    #[serde(default)]
    pub allow_exhaustion: bool,
    #[serde(default = "default_research_topic")]
    pub research_topic: String,
    #[serde(default)]
    pub scanners: Vec<ScannerConfig>,
}

fn default_research_topic() -> String {
    "features and improvements users of this project would value".to_string()
}

impl Default for DiscoverySection {
    fn default() -> Self {
        Self {
            allow_exhaustion: false,
            research_topic: default_research_topic(),
            scanners: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchSection {
    #[serde(default = "default_max_per_minute")]
    pub max_per_minute: u32,
    #[serde(default = "default_max_per_hour")]
    pub max_per_hour: u32,
}

fn default_max_per_minute() -> u32 {
    30
}

fn default_max_per_hour() -> u32 {
    500
}

impl Default for DispatchSection {
    fn default() -> Self {
        Self {
            max_per_minute: default_max_per_minute(),
            max_per_hour: default_max_per_hour(),
        }
    }
}

impl DispatchSection {
    pub fn to_rate_limiter(&self) -> RateLimiter {
        RateLimiter {
            max_per_minute: self.max_per_minute,
            max_per_hour: self.max_per_hour,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerSection {
    /// Shell command that receives the prompt on stdin.
    #[serde(default = "default_worker_command")]
    pub command: String,
    #[serde(default = "default_worker_timeout")]
    pub timeout_secs: u64,
    /// When set, validation runs this command directly; exit 0 passes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validate_command: Option<String>,
}

fn default_worker_command() -> String {
    "claude --print".to_string()
}

fn default_worker_timeout() -> u64 {
    900
}

impl Default for WorkerSection {
    fn default() -> Self {
        Self {
            command: default_worker_command(),
            timeout_secs: default_worker_timeout(),
            validate_command: None,
        }
    }
}

/// Contents of `loopsmith.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoopsmithToml {
    #[serde(default)]
    pub project: ProjectConfig,
    #[serde(default)]
    pub breakers: BreakersSection,
    #[serde(default)]
    pub lifecycle: LifecycleSection,
    #[serde(default)]
    pub coverage: CoverageSection,
    #[serde(default)]
    pub discovery: DiscoverySection,
    #[serde(default)]
    pub dispatch: DispatchSection,
    #[serde(default)]
    pub worker: WorkerSection,
}

impl LoopsmithToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse loopsmith.toml")
    }

    /// Load `.loopsmith/loopsmith.toml`, or defaults when it does not exist.
    pub fn load_or_default(loopsmith_dir: &Path) -> Result<Self> {
        let config_path = loopsmith_dir.join(CONFIG_FILE);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = self.to_toml_string()?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize loopsmith.toml")
    }

    /// Worker command, with the environment taking precedence over the file.
    pub fn worker_command(&self) -> String {
        std::env::var(WORKER_CMD_ENV)
            .ok()
            .filter(|cmd| !cmd.trim().is_empty())
            .unwrap_or_else(|| self.worker.command.clone())
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        for (category, threshold) in self.coverage.thresholds() {
            if !(0.0..=100.0).contains(&threshold) {
                warnings.push(format!(
                    "Coverage threshold for {} is {}, expected a value between 0 and 100",
                    category, threshold
                ));
            }
        }

        if self.breakers.stuck_threshold == 0 {
            warnings.push(
                "breakers.stuck_threshold is 0: stuck tasks will never be escalated".to_string(),
            );
        }

        if self.worker.command.trim().is_empty() {
            warnings.push("worker.command is empty".to_string());
        }

        if self.worker.timeout_secs == 0 {
            warnings.push("worker.timeout_secs is 0: every worker call will time out".to_string());
        }

        if let Some(load) = self.breakers.max_load_average
            && load <= 0.0
        {
            warnings.push(format!(
                "breakers.max_load_average is {}: the loop will always pause",
                load
            ));
        }

        for scanner in &self.discovery.scanners {
            if scanner.command.trim().is_empty() {
                warnings.push(format!("Scanner '{}' has an empty command", scanner.name));
            }
        }

        warnings
    }
}

/// Loaded configuration together with the project it belongs to.
#[derive(Debug, Clone)]
pub struct LoopsmithConfig {
    pub project_dir: PathBuf,
    pub loopsmith_dir: PathBuf,
    pub toml: LoopsmithToml,
    pub verbose: bool,
}

impl LoopsmithConfig {
    pub fn new(project_dir: PathBuf) -> Result<Self> {
        let project_dir = project_dir
            .canonicalize()
            .context("Failed to resolve project directory")?;
        let loopsmith_dir = crate::init::get_loopsmith_dir(&project_dir);
        let toml = LoopsmithToml::load_or_default(&loopsmith_dir)?;

        Ok(Self {
            project_dir,
            loopsmith_dir,
            toml,
            verbose: false,
        })
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn project_name(&self) -> String {
        self.toml.project.name.clone().unwrap_or_else(|| {
            self.project_dir
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "project".to_string())
        })
    }

    pub fn config_file(&self) -> PathBuf {
        self.loopsmith_dir.join(CONFIG_FILE)
    }

    pub fn validate(&self) -> Vec<String> {
        self.toml.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_empty_file_uses_defaults() {
        let toml = LoopsmithToml::parse("").unwrap();
        assert_eq!(toml.breakers.max_iterations, 100);
        assert_eq!(toml.breakers.max_wall_clock_minutes, 480);
        assert_eq!(toml.breakers.stuck_threshold, 5);
        assert_eq!(toml.lifecycle.validation_retries, 3);
        assert_eq!(toml.dispatch.max_per_minute, 30);
        assert_eq!(toml.dispatch.max_per_hour, 500);
        assert_eq!(toml.worker.timeout_secs, 900);
        assert!(!toml.discovery.allow_exhaustion);
        assert!(toml.validate().is_empty());
    }

    #[test]
    fn test_parse_full_config() {
        let content = r#"
[project]
name = "shop"

[breakers]
max_iterations = 0
max_load_average = 6.5

[coverage]
end_to_end = 90.0

[coverage.probes]
unit = "echo 'coverage: 97.5%'"

[discovery]
allow_exhaustion = true

[[discovery.scanners]]
name = "audit"
source = "security"
command = "cargo audit"

[worker]
command = "my-agent"
validate_command = "cargo test"
"#;
        let toml = LoopsmithToml::parse(content).unwrap();
        assert_eq!(toml.project.name.as_deref(), Some("shop"));
        let breakers = toml.breakers.to_breaker_config();
        assert_eq!(breakers.max_iterations, 0);
        assert_eq!(breakers.max_load_average, Some(6.5));
        assert_eq!(breakers.max_wall_clock_secs, 480 * 60);
        assert_eq!(toml.coverage.thresholds()[&CoverageCategory::EndToEnd], 90.0);
        assert_eq!(toml.coverage.probe_commands().len(), 1);
        assert!(toml.discovery.allow_exhaustion);
        assert_eq!(toml.discovery.scanners[0].source, SignalSource::Security);
        assert_eq!(toml.worker.validate_command.as_deref(), Some("cargo test"));
    }

    #[test]
    fn test_validate_reports_bad_values() {
        let content = r#"
[breakers]
stuck_threshold = 0

[coverage]
unit = 140.0

[worker]
command = "  "
"#;
        let warnings = LoopsmithToml::parse(content).unwrap().validate();
        assert_eq!(warnings.len(), 3);
        assert!(warnings.iter().any(|w| w.contains("unit")));
        assert!(warnings.iter().any(|w| w.contains("stuck_threshold")));
        assert!(warnings.iter().any(|w| w.contains("worker.command")));
    }

    #[test]
    fn test_huge_wall_clock_saturates() {
        let content = format!("[breakers]\nmax_wall_clock_minutes = {}\n", i64::MAX);
        let toml = LoopsmithToml::parse(&content).unwrap();
        assert_eq!(toml.breakers.to_breaker_config().max_wall_clock_secs, u64::MAX);
    }

    #[test]
    fn test_load_or_default_without_file() {
        let dir = tempdir().unwrap();
        let toml = LoopsmithToml::load_or_default(dir.path()).unwrap();
        assert_eq!(toml.breakers.max_iterations, 100);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempdir().unwrap();
        let mut toml = LoopsmithToml::default();
        toml.breakers.max_iterations = 7;
        let path = dir.path().join(CONFIG_FILE);
        toml.save(&path).unwrap();
        let loaded = LoopsmithToml::load(&path).unwrap();
        assert_eq!(loaded.breakers.max_iterations, 7);
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        let err = LoopsmithToml::parse("[breakers\nmax = ").unwrap_err();
        assert!(err.to_string().contains("loopsmith.toml"));
    }

    #[test]
    fn test_project_name_falls_back_to_directory() {
        let dir = tempdir().unwrap();
        let config = LoopsmithConfig::new(dir.path().to_path_buf()).unwrap();
        let expected = dir
            .path()
            .canonicalize()
            .unwrap()
            .file_name()
            .unwrap()
            .to_string_lossy()
            .to_string();
        assert_eq!(config.project_name(), expected);
    }
}
