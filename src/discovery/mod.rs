//! Work discovery engine.
//!
//! When the backlog runs dry the engine fans out every configured scanner
//! concurrently, scores what they report and hands back new backlog items.
//! If the scans produce nothing new it falls back, in order, to research
//! findings, a fixed polish catalog and finally upkeep work stamped with the
//! discovery generation. The last tier always yields fresh items unless the
//! caller allows exhaustion.

mod catalog;
mod scoring;

pub use scoring::{prioritize, score};

use crate::backlog::{BacklogItem, Complexity, Priority, SignalSource};
use crate::capabilities::{DiscoveryScanner, Researcher};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// A raw finding from one scanner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoverySignal {
    pub source: SignalSource,
    pub finding: String,
    #[serde(default)]
    pub detail: String,
    #[serde(default)]
    pub proposed: Priority,
    #[serde(default)]
    pub complexity: Complexity,
}

/// A research result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub title: String,
    #[serde(default)]
    pub detail: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub complexity: Complexity,
}

impl Finding {
    fn into_signal(self) -> DiscoverySignal {
        DiscoverySignal {
            source: SignalSource::Research,
            finding: self.title,
            detail: self.detail,
            proposed: self.priority,
            complexity: self.complexity,
        }
    }
}

/// What scanners and the pure reduction know about the project.
#[derive(Debug, Clone, Default)]
pub struct ScanContext {
    pub project_dir: PathBuf,
    /// Incremented on every discovery pass.
    pub generation: u64,
    /// Ids already in the backlog, in any status.
    pub known_ids: HashSet<String>,
    /// Make the last fallback tier a fixed list.
    pub allow_exhaustion: bool,
}

/// A list with at least one element.
#[derive(Debug, Clone, PartialEq)]
pub struct NonEmpty<T> {
    pub head: T,
    pub tail: Vec<T>,
}

impl<T> NonEmpty<T> {
    pub fn new(head: T) -> Self {
        Self {
            head,
            tail: Vec::new(),
        }
    }

    pub fn from_vec(mut items: Vec<T>) -> Option<Self> {
        if items.is_empty() {
            return None;
        }
        let head = items.remove(0);
        Some(Self { head, tail: items })
    }

    pub fn len(&self) -> usize {
        1 + self.tail.len()
    }

    pub fn first(&self) -> &T {
        &self.head
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        std::iter::once(&self.head).chain(self.tail.iter())
    }

    pub fn into_vec(self) -> Vec<T> {
        let mut items = Vec::with_capacity(1 + self.tail.len());
        items.push(self.head);
        items.extend(self.tail);
        items
    }
}

/// Which fallback tier produced the items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiscoveryTier {
    Signals,
    Research,
    Polish,
    Upkeep,
}

impl fmt::Display for DiscoveryTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DiscoveryTier::Signals => "signals",
            DiscoveryTier::Research => "research",
            DiscoveryTier::Polish => "polish",
            DiscoveryTier::Upkeep => "upkeep",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone)]
pub struct Discovered {
    pub tier: DiscoveryTier,
    pub items: NonEmpty<BacklogItem>,
}

fn unknown(items: Vec<BacklogItem>, known: &HashSet<String>) -> Vec<BacklogItem> {
    items
        .into_iter()
        .filter(|item| !known.contains(&item.id))
        .collect()
}

/// Reduce scan signals and research findings to new backlog work.
///
/// Never returns an empty list: each tier is tried in turn and the last one
/// always has items. Items whose ids are already known are skipped, except
/// for an exhaustible final tier, which is returned as-is so insertion can
/// report that nothing new was found.
pub fn discover(
    signals: &[DiscoverySignal],
    findings: Vec<Finding>,
    context: &ScanContext,
) -> Discovered {
    let from_signals = unknown(prioritize(signals), &context.known_ids);
    if let Some(items) = NonEmpty::from_vec(from_signals) {
        return Discovered {
            tier: DiscoveryTier::Signals,
            items,
        };
    }

    let research: Vec<DiscoverySignal> = findings.into_iter().map(Finding::into_signal).collect();
    let from_research = unknown(prioritize(&research), &context.known_ids);
    if let Some(items) = NonEmpty::from_vec(from_research) {
        return Discovered {
            tier: DiscoveryTier::Research,
            items,
        };
    }

    if let Some(items) = NonEmpty::from_vec(catalog::polish_items(&context.known_ids)) {
        return Discovered {
            tier: DiscoveryTier::Polish,
            items,
        };
    }

    let generation = (!context.allow_exhaustion).then_some(context.generation);
    let upkeep = catalog::upkeep_items(generation);
    let fresh = unknown(upkeep.clone(), &context.known_ids);
    let items = NonEmpty::from_vec(fresh)
        .or_else(|| NonEmpty::from_vec(upkeep))
        .unwrap_or_else(|| NonEmpty::new(fallback_item(context.generation)));
    Discovered {
        tier: DiscoveryTier::Upkeep,
        items,
    }
}

// Only reachable if the upkeep catalog is emptied.
fn fallback_item(generation: u64) -> BacklogItem {
    BacklogItem::new(
        format!("Review project health (pass {})", generation),
        "",
        Priority::Low,
        Complexity::Small,
        SignalSource::Documentation,
    )
}

/// Runs scanners and research, then reduces their output with [`discover`].
pub struct DiscoveryEngine {
    scanners: Vec<Arc<dyn DiscoveryScanner>>,
    researcher: Arc<dyn Researcher>,
    research_topic: String,
}

impl DiscoveryEngine {
    pub fn new(
        scanners: Vec<Arc<dyn DiscoveryScanner>>,
        researcher: Arc<dyn Researcher>,
        research_topic: impl Into<String>,
    ) -> Self {
        Self {
            scanners,
            researcher,
            research_topic: research_topic.into(),
        }
    }

    /// Scan concurrently and fall back through the tiers.
    pub async fn run(&self, context: &ScanContext) -> Discovered {
        let scans = self.scanners.iter().map(|scanner| async move {
            let result = scanner.scan(context).await;
            (scanner.name().to_string(), result)
        });

        let mut signals = Vec::new();
        for (name, result) in join_all(scans).await {
            match result {
                Ok(found) => {
                    tracing::debug!(scanner = %name, count = found.len(), "scan finished");
                    signals.extend(found);
                }
                Err(e) => {
                    tracing::warn!(scanner = %name, error = %e, "scanner failed, treating as empty");
                }
            }
        }

        let has_new_signals = prioritize(&signals)
            .iter()
            .any(|item| !context.known_ids.contains(&item.id));

        let findings = if has_new_signals {
            Vec::new()
        } else {
            match self.researcher.query(&self.research_topic).await {
                Ok(findings) => findings,
                Err(e) => {
                    tracing::warn!(error = %e, "research query failed");
                    Vec::new()
                }
            }
        };

        let discovered = discover(&signals, findings, context);
        tracing::info!(
            tier = %discovered.tier,
            items = discovered.items.len(),
            generation = context.generation,
            "discovery pass complete"
        );
        discovered
    }
}
