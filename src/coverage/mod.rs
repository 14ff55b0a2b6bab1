//! Coverage gate.
//!
//! At each Validate boundary the gate asks one probe per category for a
//! percentage, compares it with the configured threshold and turns every
//! shortfall into a Critical backlog item. The gate never blocks the task
//! it is evaluating.

use crate::backlog::{BacklogItem, Complexity, Priority, SignalSource};
use crate::capabilities::CoverageProbe;
use crate::task::Task;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CoverageCategory {
    Unit,
    Behavioral,
    EndToEnd,
    Mutation,
}

impl CoverageCategory {
    pub fn all() -> [CoverageCategory; 4] {
        [
            CoverageCategory::Unit,
            CoverageCategory::Behavioral,
            CoverageCategory::EndToEnd,
            CoverageCategory::Mutation,
        ]
    }
}

impl fmt::Display for CoverageCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CoverageCategory::Unit => "unit",
            CoverageCategory::Behavioral => "behavioral",
            CoverageCategory::EndToEnd => "end-to-end",
            CoverageCategory::Mutation => "mutation",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for CoverageCategory {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CoverageCategory::all()
            .into_iter()
            .find(|c| c.to_string() == s.to_lowercase())
            .ok_or_else(|| anyhow::anyhow!("Unknown coverage category '{}'", s))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryCoverage {
    pub percent: f64,
    pub threshold: f64,
}

impl CategoryCoverage {
    pub fn passes(&self) -> bool {
        self.percent >= self.threshold
    }
}

/// Per-category measurements. Unmeasured categories are absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoverageReport {
    pub categories: BTreeMap<CoverageCategory, CategoryCoverage>,
    pub all_pass: bool,
}

impl CoverageReport {
    pub fn from_measurements(categories: BTreeMap<CoverageCategory, CategoryCoverage>) -> Self {
        let all_pass = categories.values().all(CategoryCoverage::passes);
        Self {
            categories,
            all_pass,
        }
    }

    pub fn failing(&self) -> impl Iterator<Item = (&CoverageCategory, &CategoryCoverage)> {
        self.categories.iter().filter(|(_, c)| !c.passes())
    }

    /// One Critical coverage item per failing category.
    ///
    /// Coverage is a project-wide metric, so the title (and with it the item
    /// id) depends only on the category and threshold. A gap that persists
    /// across tasks maps to the same item.
    pub fn gap_items(&self) -> Vec<BacklogItem> {
        self.failing()
            .map(|(category, coverage)| {
                BacklogItem::new(
                    format!("Raise {} coverage to {}%", category, coverage.threshold),
                    format!(
                        "{} coverage is {:.1}%, below the {:.1}% threshold",
                        category, coverage.percent, coverage.threshold
                    ),
                    Priority::Critical,
                    Complexity::Medium,
                    SignalSource::Coverage,
                )
            })
            .collect()
    }
}

/// Result of one gate evaluation.
#[derive(Debug, Clone)]
pub struct GateResult {
    pub report: CoverageReport,
    pub new_items: Vec<BacklogItem>,
}

pub struct CoverageGate {
    probes: BTreeMap<CoverageCategory, Arc<dyn CoverageProbe>>,
    thresholds: BTreeMap<CoverageCategory, f64>,
}

impl CoverageGate {
    pub fn new(
        probes: BTreeMap<CoverageCategory, Arc<dyn CoverageProbe>>,
        thresholds: BTreeMap<CoverageCategory, f64>,
    ) -> Self {
        Self { probes, thresholds }
    }

    fn threshold(&self, category: CoverageCategory) -> f64 {
        self.thresholds.get(&category).copied().unwrap_or(100.0)
    }

    pub async fn evaluate(&self, task: &Task) -> GateResult {
        let mut measured = BTreeMap::new();
        for (category, probe) in &self.probes {
            match probe.measure(task).await {
                Ok(Some(percent)) => {
                    measured.insert(
                        *category,
                        CategoryCoverage {
                            percent,
                            threshold: self.threshold(*category),
                        },
                    );
                }
                Ok(None) => {
                    tracing::info!(category = %category, "coverage not measurable, omitted");
                }
                Err(e) => {
                    tracing::warn!(category = %category, error = %e, "coverage probe failed, omitted");
                }
            }
        }

        let report = CoverageReport::from_measurements(measured);
        let new_items = report.gap_items();
        if !report.all_pass {
            tracing::warn!(
                task = %task.id,
                gaps = new_items.len(),
                "coverage below threshold"
            );
        }
        GateResult { report, new_items }
    }
}
