use super::{BacklogItem, ItemStatus, Priority};
use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// The ordered backlog.
///
/// Items are kept sorted by [`BacklogItem::sort_key`], so iteration order is
/// the promotion order and is identical across runs on unchanged input.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Backlog {
    items: Vec<BacklogItem>,
}

/// Counts by status, used by status reports and run summaries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BacklogSummary {
    pub total: usize,
    pub pending: usize,
    pub in_progress: usize,
    pub done: usize,
    pub blocked: usize,
}

impl Backlog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an item. Returns `false` and leaves the backlog untouched when
    /// an item with the same id already exists.
    pub fn insert(&mut self, item: BacklogItem) -> bool {
        if self.contains(&item.id) {
            return false;
        }
        self.items.push(item);
        self.resort();
        true
    }

    /// Insert many items, returning how many were new.
    pub fn extend<I>(&mut self, items: I) -> usize
    where
        I: IntoIterator<Item = BacklogItem>,
    {
        let mut added = 0;
        for item in items {
            if !self.contains(&item.id) {
                self.items.push(item);
                added += 1;
            }
        }
        if added > 0 {
            self.resort();
        }
        added
    }

    /// Insert items, returning an existing `done` item with the same id to
    /// pending with the new description. In-progress and blocked items are
    /// left alone. Returns how many items became pending.
    pub fn requeue<I>(&mut self, items: I) -> usize
    where
        I: IntoIterator<Item = BacklogItem>,
    {
        let mut queued = 0;
        for item in items {
            match self.items.iter_mut().find(|i| i.id == item.id) {
                Some(existing) if existing.status == ItemStatus::Done => {
                    existing.status = ItemStatus::Pending;
                    existing.description = item.description;
                    queued += 1;
                }
                Some(_) => {}
                None => {
                    self.items.push(item);
                    queued += 1;
                }
            }
        }
        if queued > 0 {
            self.resort();
        }
        queued
    }

    pub fn contains(&self, id: &str) -> bool {
        self.items.iter().any(|i| i.id == id)
    }

    pub fn get(&self, id: &str) -> Option<&BacklogItem> {
        self.items.iter().find(|i| i.id == id)
    }

    pub fn items(&self) -> &[BacklogItem] {
        &self.items
    }

    pub fn ids(&self) -> HashSet<String> {
        self.items.iter().map(|i| i.id.clone()).collect()
    }

    /// Pending items in promotion order.
    pub fn pending(&self) -> Vec<&BacklogItem> {
        self.items.iter().filter(|i| i.status.is_pending()).collect()
    }

    pub fn has_pending(&self) -> bool {
        self.items.iter().any(|i| i.status.is_pending())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn mark_in_progress(&mut self, id: &str) -> Result<()> {
        self.set_status(id, ItemStatus::InProgress)
    }

    pub fn mark_done(&mut self, id: &str) -> Result<()> {
        self.set_status(id, ItemStatus::Done)
    }

    /// Record a block reason and move the item to `priority`.
    pub fn mark_blocked(&mut self, id: &str, reason: &str, priority: Priority) -> Result<()> {
        let item = self.item_mut(id)?;
        item.status = ItemStatus::Blocked {
            reason: reason.to_string(),
        };
        item.priority = priority;
        self.resort();
        Ok(())
    }

    pub fn summary(&self) -> BacklogSummary {
        let mut summary = BacklogSummary {
            total: self.items.len(),
            ..Default::default()
        };
        for item in &self.items {
            match item.status {
                ItemStatus::Pending => summary.pending += 1,
                ItemStatus::InProgress => summary.in_progress += 1,
                ItemStatus::Done => summary.done += 1,
                ItemStatus::Blocked { .. } => summary.blocked += 1,
            }
        }
        summary
    }

    fn set_status(&mut self, id: &str, status: ItemStatus) -> Result<()> {
        self.item_mut(id)?.status = status;
        Ok(())
    }

    fn item_mut(&mut self, id: &str) -> Result<&mut BacklogItem> {
        self.items
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or_else(|| anyhow!("Backlog item {} not found", id))
    }

    fn resort(&mut self) {
        self.items.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backlog::{Complexity, SignalSource};

    fn item(title: &str, priority: Priority, source: SignalSource) -> BacklogItem {
        BacklogItem::new(title, "", priority, Complexity::Small, source)
    }

    #[test]
    fn test_insert_rejects_duplicate_ids() {
        let mut backlog = Backlog::new();
        assert!(backlog.insert(item("Add docs", Priority::Low, SignalSource::Documentation)));
        assert!(!backlog.insert(item("Add docs", Priority::High, SignalSource::Documentation)));
        assert_eq!(backlog.len(), 1);
        assert_eq!(backlog.items()[0].priority, Priority::Low);
    }

    #[test]
    fn test_extend_counts_only_new_items() {
        let mut backlog = Backlog::new();
        backlog.insert(item("A", Priority::Low, SignalSource::Polish));
        let added = backlog.extend(vec![
            item("A", Priority::Low, SignalSource::Polish),
            item("B", Priority::Low, SignalSource::Polish),
        ]);
        assert_eq!(added, 1);
        assert_eq!(backlog.len(), 2);
    }

    #[test]
    fn test_requeue_reopens_done_items_only() {
        let mut backlog = Backlog::new();
        let gap = |title: &str| item(title, Priority::Critical, SignalSource::Coverage);
        let done = gap("Raise unit coverage to 100%");
        let active = gap("Raise mutation coverage to 100%");
        let (done_id, active_id) = (done.id.clone(), active.id.clone());
        backlog.extend(vec![done.clone(), active.clone()]);
        backlog.mark_done(&done_id).unwrap();
        backlog.mark_in_progress(&active_id).unwrap();

        let mut again = done;
        again.description = "unit coverage is 61.0%".to_string();
        let queued = backlog.requeue(vec![
            again,
            active,
            gap("Raise end-to-end coverage to 100%"),
        ]);

        assert_eq!(queued, 2);
        assert_eq!(backlog.len(), 3);
        let reopened = backlog.get(&done_id).unwrap();
        assert_eq!(reopened.status, ItemStatus::Pending);
        assert_eq!(reopened.description, "unit coverage is 61.0%");
        assert_eq!(backlog.get(&active_id).unwrap().status, ItemStatus::InProgress);
    }

    #[test]
    fn test_ordering_by_priority_then_source() {
        let mut backlog = Backlog::new();
        backlog.extend(vec![
            item("slow query", Priority::High, SignalSource::Performance),
            item("weak hash", Priority::High, SignalSource::Security),
            item("missing e2e", Priority::Critical, SignalSource::Coverage),
            item("typo", Priority::Low, SignalSource::Polish),
        ]);
        let titles: Vec<&str> = backlog.items().iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["missing e2e", "weak hash", "slow query", "typo"]);
    }

    #[test]
    fn test_blocked_item_is_demoted_and_kept() {
        let mut backlog = Backlog::new();
        let it = item("feature", Priority::High, SignalSource::Manual);
        let id = it.id.clone();
        backlog.insert(it);
        backlog.mark_in_progress(&id).unwrap();
        backlog
            .mark_blocked(&id, "missing dependency X", Priority::Medium)
            .unwrap();

        let stored = backlog.get(&id).unwrap();
        assert_eq!(stored.status.to_string(), "blocked: missing dependency X");
        assert_eq!(stored.priority, Priority::Medium);
        assert!(!backlog.has_pending());
        assert_eq!(backlog.summary().blocked, 1);
    }

    #[test]
    fn test_unknown_id_is_an_error() {
        let mut backlog = Backlog::new();
        let err = backlog.mark_done("nope").unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_summary_counts_statuses() {
        let mut backlog = Backlog::new();
        let a = item("a", Priority::Low, SignalSource::Polish);
        let b = item("b", Priority::Low, SignalSource::Polish);
        let a_id = a.id.clone();
        backlog.extend(vec![a, b]);
        backlog.mark_done(&a_id).unwrap();
        let summary = backlog.summary();
        assert_eq!(summary.total, 2);
        assert_eq!(summary.done, 1);
        assert_eq!(summary.pending, 1);
    }
}
