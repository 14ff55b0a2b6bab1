//! Backlog item types.
//!
//! ## Types
//!
//! - [`Priority`]: urgency classification, ordered most urgent first
//! - [`Complexity`]: rough effort estimate used by prioritization
//! - [`SignalSource`]: where an item was discovered, ordered by tie-break precedence
//! - [`ItemStatus`]: lifecycle of an item in the backlog
//! - [`BacklogItem`]: one unit of future work
//!
//! Items are never deleted. Promotion, completion and blocking only move the
//! status, so the backlog doubles as an audit trail.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

pub mod inbox;
pub mod store;
pub use inbox::Inbox;
pub use store::{Backlog, BacklogSummary};

/// Urgency of a backlog item.
///
/// Ordered from most to least urgent, so sorting ascending puts
/// `Critical` first.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Critical,
    High,
    #[default]
    Medium,
    Low,
    Icebox,
}

impl Priority {
    /// One level less urgent. `Icebox` stays `Icebox`.
    pub fn demoted(self) -> Self {
        match self {
            Priority::Critical => Priority::High,
            Priority::High => Priority::Medium,
            Priority::Medium => Priority::Low,
            Priority::Low | Priority::Icebox => Priority::Icebox,
        }
    }

    /// Impact weight used by the impact x ease score.
    pub fn impact(self) -> u32 {
        match self {
            Priority::Critical => 4,
            Priority::High => 3,
            Priority::Medium => 2,
            Priority::Low => 1,
            Priority::Icebox => 0,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Priority::Critical => "critical",
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
            Priority::Icebox => "icebox",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for Priority {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "critical" => Ok(Priority::Critical),
            "high" => Ok(Priority::High),
            "medium" => Ok(Priority::Medium),
            "low" => Ok(Priority::Low),
            "icebox" => Ok(Priority::Icebox),
            _ => anyhow::bail!(
                "Invalid priority '{}'. Valid values: critical, high, medium, low, icebox",
                s
            ),
        }
    }
}

/// Rough effort estimate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Trivial,
    Small,
    #[default]
    Medium,
    Large,
}

impl Complexity {
    /// Effort points, 1 (trivial) to 4 (large).
    pub fn effort(self) -> u32 {
        match self {
            Complexity::Trivial => 1,
            Complexity::Small => 2,
            Complexity::Medium => 3,
            Complexity::Large => 4,
        }
    }
}

impl fmt::Display for Complexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Complexity::Trivial => "trivial",
            Complexity::Small => "small",
            Complexity::Medium => "medium",
            Complexity::Large => "large",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for Complexity {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trivial" => Ok(Complexity::Trivial),
            "small" => Ok(Complexity::Small),
            "medium" => Ok(Complexity::Medium),
            "large" => Ok(Complexity::Large),
            _ => anyhow::bail!(
                "Invalid complexity '{}'. Valid values: trivial, small, medium, large",
                s
            ),
        }
    }
}

/// Where a piece of work was discovered.
///
/// Declaration order is the tie-break precedence used when two items share
/// a priority: coverage > security > code-health > dependencies > compliance
/// > accessibility > i18n > performance > market-research, followed by the
/// discovery fallback tiers and manually inserted work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignalSource {
    Coverage,
    Security,
    CodeHealth,
    Dependencies,
    Compliance,
    Accessibility,
    I18n,
    Performance,
    MarketResearch,
    Research,
    Polish,
    Documentation,
    Manual,
}

impl SignalSource {
    /// Sources whose findings are always Critical.
    pub fn is_always_critical(&self) -> bool {
        matches!(self, SignalSource::Coverage | SignalSource::Security)
    }
}

impl fmt::Display for SignalSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SignalSource::Coverage => "coverage",
            SignalSource::Security => "security",
            SignalSource::CodeHealth => "code-health",
            SignalSource::Dependencies => "dependencies",
            SignalSource::Compliance => "compliance",
            SignalSource::Accessibility => "accessibility",
            SignalSource::I18n => "i18n",
            SignalSource::Performance => "performance",
            SignalSource::MarketResearch => "market-research",
            SignalSource::Research => "research",
            SignalSource::Polish => "polish",
            SignalSource::Documentation => "documentation",
            SignalSource::Manual => "manual",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for SignalSource {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let all = [
            SignalSource::Coverage,
            SignalSource::Security,
            SignalSource::CodeHealth,
            SignalSource::Dependencies,
            SignalSource::Compliance,
            SignalSource::Accessibility,
            SignalSource::I18n,
            SignalSource::Performance,
            SignalSource::MarketResearch,
            SignalSource::Research,
            SignalSource::Polish,
            SignalSource::Documentation,
            SignalSource::Manual,
        ];
        all.into_iter()
            .find(|src| src.to_string() == s.to_lowercase())
            .ok_or_else(|| anyhow::anyhow!("Unknown signal source '{}'", s))
    }
}

/// Status of an item in the backlog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum ItemStatus {
    Pending,
    InProgress,
    Done,
    Blocked { reason: String },
}

impl ItemStatus {
    pub fn is_pending(&self) -> bool {
        matches!(self, ItemStatus::Pending)
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemStatus::Pending => write!(f, "pending"),
            ItemStatus::InProgress => write!(f, "in-progress"),
            ItemStatus::Done => write!(f, "done"),
            ItemStatus::Blocked { reason } => write!(f, "blocked: {}", reason),
        }
    }
}

/// One unit of discovered or requested work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BacklogItem {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub priority: Priority,
    #[serde(default)]
    pub complexity: Complexity,
    pub source: SignalSource,
    pub status: ItemStatus,
    pub created_at: DateTime<Utc>,
}

impl BacklogItem {
    /// Create a pending item. The id is derived from the source and title so
    /// the same finding always maps to the same item.
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        priority: Priority,
        complexity: Complexity,
        source: SignalSource,
    ) -> Self {
        let title = title.into();
        Self {
            id: item_id(source, &title),
            title,
            description: description.into(),
            priority,
            complexity,
            source,
            status: ItemStatus::Pending,
            created_at: Utc::now(),
        }
    }

    /// Ordering key: priority, then source precedence, then title and id.
    pub fn sort_key(&self) -> (Priority, SignalSource, &str, &str) {
        (self.priority, self.source, &self.title, &self.id)
    }
}

/// Stable content id: the first 12 hex characters of SHA-256(source|title).
pub fn item_id(source: SignalSource, title: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.to_string().as_bytes());
    hasher.update(b"|");
    hasher.update(title.trim().to_lowercase().as_bytes());
    let digest = hasher.finalize();
    digest.iter().take(6).map(|b| format!("{:02x}", b)).collect()
}
