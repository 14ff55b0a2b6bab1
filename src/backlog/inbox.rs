use super::BacklogItem;
use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Queue of externally added items, one JSON object per line.
///
/// `loopsmith backlog add` appends here; the orchestrator claims the queue
/// at the start of a tick, so the backlog is only ever mutated by the tick.
/// Claimed items stay on disk in a sibling `.claimed` file until the
/// snapshot holding them is saved and the claim is acknowledged. A claim
/// that was never acknowledged is handed out again on the next claim.
#[derive(Debug, Clone)]
pub struct Inbox {
    path: PathBuf,
}

impl Inbox {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn claimed_path(&self) -> PathBuf {
        self.path.with_extension("jsonl.claimed")
    }

    pub fn push(&self, item: &BacklogItem) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let mut line = serde_json::to_string(item).context("Failed to serialize backlog item")?;
        line.push('\n');
        append(&self.path, line.as_bytes())
    }

    /// Queued and claimed-but-unacknowledged items. Unparseable lines are
    /// skipped.
    pub fn peek(&self) -> Result<Vec<BacklogItem>> {
        let mut items = read_items(&self.claimed_path())?;
        items.extend(read_items(&self.path)?);
        Ok(items)
    }

    /// Claim every queued item, including any earlier claim that was never
    /// acknowledged. The inbox is renamed before reading so a concurrent
    /// `push` lands in a fresh file.
    pub fn claim(&self) -> Result<Vec<BacklogItem>> {
        let claimed = self.claimed_path();
        if self.path.exists() {
            if claimed.exists() {
                let incoming = self.path.with_extension("jsonl.incoming");
                fs::rename(&self.path, &incoming).context("Failed to claim backlog inbox")?;
                let fresh = fs::read(&incoming).context("Failed to read backlog inbox")?;
                append(&claimed, &fresh)?;
                fs::remove_file(&incoming).context("Failed to remove claimed backlog inbox")?;
            } else {
                fs::rename(&self.path, &claimed).context("Failed to claim backlog inbox")?;
            }
        }
        read_items(&claimed)
    }

    /// Forget the current claim once its items are persisted elsewhere.
    pub fn acknowledge(&self) -> Result<()> {
        let claimed = self.claimed_path();
        if claimed.exists() {
            fs::remove_file(&claimed).context("Failed to remove claimed backlog inbox")?;
        }
        Ok(())
    }
}

fn append(path: &Path, bytes: &[u8]) -> Result<()> {
    fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .context("Failed to open backlog inbox")?
        .write_all(bytes)
        .context("Failed to write backlog inbox")
}

fn read_items(path: &Path) -> Result<Vec<BacklogItem>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = fs::read_to_string(path).context("Failed to read backlog inbox")?;
    Ok(content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match serde_json::from_str(line) {
            Ok(item) => Some(item),
            Err(e) => {
                tracing::warn!(error = %e, "skipping malformed inbox line");
                None
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backlog::{Complexity, Priority, SignalSource};
    use tempfile::tempdir;

    fn item(title: &str) -> BacklogItem {
        BacklogItem::new(
            title,
            "",
            Priority::High,
            Complexity::Small,
            SignalSource::Manual,
        )
    }

    #[test]
    fn test_claim_then_acknowledge() {
        let dir = tempdir().unwrap();
        let inbox = Inbox::new(dir.path().join("inbox.jsonl"));
        inbox.push(&item("Export CSV")).unwrap();
        inbox.push(&item("Import CSV")).unwrap();

        assert_eq!(inbox.peek().unwrap().len(), 2);
        let claimed = inbox.claim().unwrap();
        assert_eq!(claimed.len(), 2);
        assert_eq!(claimed[0].title, "Export CSV");
        assert!(!inbox.path().exists());

        inbox.acknowledge().unwrap();
        assert!(inbox.claim().unwrap().is_empty());
        assert!(inbox.peek().unwrap().is_empty());
    }

    #[test]
    fn test_unacknowledged_claim_is_handed_out_again() {
        let dir = tempdir().unwrap();
        let inbox = Inbox::new(dir.path().join("inbox.jsonl"));
        inbox.push(&item("Export CSV")).unwrap();
        assert_eq!(inbox.claim().unwrap().len(), 1);

        // the claimer died before acknowledging; a later push joins the claim
        inbox.push(&item("Import CSV")).unwrap();
        assert_eq!(inbox.peek().unwrap().len(), 2);
        let titles: Vec<String> = inbox
            .claim()
            .unwrap()
            .into_iter()
            .map(|i| i.title)
            .collect();
        assert_eq!(titles, vec!["Export CSV", "Import CSV"]);
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let dir = tempdir().unwrap();
        let inbox = Inbox::new(dir.path().join("inbox.jsonl"));
        inbox.push(&item("Export CSV")).unwrap();
        let mut file = fs::OpenOptions::new()
            .append(true)
            .open(inbox.path())
            .unwrap();
        writeln!(file, "{{ broken").unwrap();

        assert_eq!(inbox.claim().unwrap().len(), 1);
    }
}
