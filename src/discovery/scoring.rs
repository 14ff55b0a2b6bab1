//! Impact x ease prioritization of discovery signals.

use super::DiscoverySignal;
use crate::backlog::{BacklogItem, Complexity, Priority, SignalSource};
use std::collections::HashSet;

/// Priority assigned to a finding from `source`.
///
/// Coverage and security findings are always Critical. Everything else is
/// scored as `impact(proposed) * (5 - effort(complexity))`: 9 and above is
/// High, 4 and above is Medium, anything lower is Low.
pub fn score(source: SignalSource, proposed: Priority, complexity: Complexity) -> Priority {
    if source.is_always_critical() {
        return Priority::Critical;
    }
    let points = proposed.impact() * (5 - complexity.effort());
    if points >= 9 {
        Priority::High
    } else if points >= 4 {
        Priority::Medium
    } else {
        Priority::Low
    }
}

/// Turn signals into scored items in backlog order, one item per id.
pub fn prioritize(signals: &[DiscoverySignal]) -> Vec<BacklogItem> {
    let mut seen = HashSet::new();
    let mut items: Vec<BacklogItem> = signals
        .iter()
        .map(|signal| {
            BacklogItem::new(
                signal.finding.trim(),
                signal.detail.clone(),
                score(signal.source, signal.proposed, signal.complexity),
                signal.complexity,
                signal.source,
            )
        })
        .filter(|item| !item.title.is_empty() && seen.insert(item.id.clone()))
        .collect();
    items.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    items
}
