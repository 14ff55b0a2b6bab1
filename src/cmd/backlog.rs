//! Backlog inspection and manual items (`loopsmith backlog`).

use anyhow::{Context, Result};
use console::style;
use std::path::Path;

use super::super::BacklogCommands;
use super::require_initialized;

pub fn cmd_backlog(project_dir: &Path, command: BacklogCommands) -> Result<()> {
    require_initialized(project_dir)?;

    match command {
        BacklogCommands::Add {
            title,
            description,
            priority,
            complexity,
        } => add_item(project_dir, &title, &description, &priority, &complexity),
        BacklogCommands::List { all } => list_items(project_dir, all),
    }
}

fn add_item(
    project_dir: &Path,
    title: &str,
    description: &str,
    priority: &str,
    complexity: &str,
) -> Result<()> {
    use loopsmith::backlog::{BacklogItem, Complexity, Inbox, Priority, SignalSource};
    use loopsmith::config::Config;

    if title.trim().is_empty() {
        anyhow::bail!("Backlog item title cannot be empty");
    }
    let priority: Priority = priority.parse()?;
    let complexity: Complexity = complexity.parse()?;

    let config = Config::new(project_dir.to_path_buf(), false)?;
    let item = BacklogItem::new(
        title.trim(),
        description,
        priority,
        complexity,
        SignalSource::Manual,
    );
    Inbox::new(&config.inbox_file)
        .push(&item)
        .context("Failed to queue backlog item")?;

    println!(
        "{} Queued {} ({}, {})",
        style("+").green().bold(),
        style(&item.title).bold(),
        item.priority,
        item.id
    );
    println!("It joins the backlog on the next tick of `loopsmith run`.");

    Ok(())
}

fn list_items(project_dir: &Path, all: bool) -> Result<()> {
    use loopsmith::backlog::{BacklogItem, Inbox, ItemStatus};
    use loopsmith::config::Config;
    use loopsmith::errors::StateError;
    use loopsmith::orchestrator::{LoadOutcome, StateStore};

    let config = Config::new(project_dir.to_path_buf(), false)?;
    let state = match StateStore::new(&config.state_file).load()? {
        LoadOutcome::Fresh(state) | LoadOutcome::Loaded(state) => state,
        LoadOutcome::Corrupt { backup, message } => {
            return Err(StateError::Corrupted {
                path: config.state_file.clone(),
                backup,
                message,
            }
            .into());
        }
    };
    let queued = Inbox::new(&config.inbox_file).peek()?;

    let mut items: Vec<&BacklogItem> = if all {
        state.backlog.items().iter().collect()
    } else {
        state.backlog.pending()
    };
    items.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));

    if items.is_empty() && queued.is_empty() {
        println!("Backlog is empty.");
        return Ok(());
    }

    println!();
    println!(
        "{:<13} {:<9} {:<15} {:<12} Title",
        "Id", "Priority", "Source", "Status"
    );
    println!(
        "{:<13} {:<9} {:<15} {:<12} -----",
        "------------", "--------", "--------------", "-----------"
    );
    for item in &items {
        let status = match &item.status {
            ItemStatus::Pending => style("pending".to_string()).cyan(),
            ItemStatus::InProgress => style("in-progress".to_string()).yellow(),
            ItemStatus::Done => style("done".to_string()).green(),
            ItemStatus::Blocked { .. } => style("blocked".to_string()).red(),
        };
        println!(
            "{:<13} {:<9} {:<15} {:<12} {}",
            item.id,
            item.priority.to_string(),
            item.source.to_string(),
            status,
            item.title
        );
        if all && let ItemStatus::Blocked { reason } = &item.status {
            println!("{:<13} {}", "", style(reason).dim());
        }
    }
    for item in &queued {
        println!(
            "{:<13} {:<9} {:<15} {:<12} {}",
            item.id,
            item.priority.to_string(),
            item.source.to_string(),
            style("queued".to_string()).dim(),
            item.title
        );
    }
    println!();
    println!(
        "{} listed, {} queued for the next tick",
        items.len(),
        queued.len()
    );

    Ok(())
}
