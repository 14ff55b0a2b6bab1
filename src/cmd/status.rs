//! Snapshot inspection (`loopsmith status`).

use anyhow::Result;
use console::style;
use std::path::Path;

use super::require_initialized;

pub fn cmd_status(project_dir: &Path, json: bool) -> Result<()> {
    use loopsmith::backlog::Inbox;
    use loopsmith::breakers::StopSignal;
    use loopsmith::config::Config;
    use loopsmith::errors::StateError;
    use loopsmith::orchestrator::{LoadOutcome, StateStore, StatusReport};

    require_initialized(project_dir)?;
    let config = Config::new(project_dir.to_path_buf(), false)?;

    let store = StateStore::new(&config.state_file);
    let (state, fresh) = match store.load()? {
        LoadOutcome::Fresh(state) => (state, true),
        LoadOutcome::Loaded(state) => (state, false),
        LoadOutcome::Corrupt { backup, message } => {
            return Err(StateError::Corrupted {
                path: config.state_file.clone(),
                backup,
                message,
            }
            .into());
        }
    };

    let stop_raised = StopSignal::new(&config.stop_file).is_raised();
    let report = StatusReport::new(&state, stop_raised);
    let queued = Inbox::new(&config.inbox_file).peek()?.len();

    if json {
        let mut value = serde_json::to_value(&report)?;
        value["queued"] = serde_json::json!(queued);
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!();
    println!("{}", style("Loopsmith Status").bold());
    println!("================");
    println!();
    if fresh {
        println!("No run recorded yet. Start one with `loopsmith run`.");
        println!();
    }

    match &report.active_task {
        Some(task) => println!(
            "Active task: {} {} ({})",
            style(&task.title).bold(),
            style(format!("[{}]", task.phase)).cyan(),
            task.id
        ),
        None => println!("Active task: {}", style("none").dim()),
    }
    println!();

    println!("Backlog:");
    println!("  Pending:     {}", style(report.backlog.pending).cyan());
    println!("  In progress: {}", report.backlog.in_progress);
    println!("  Done:        {}", style(report.backlog.done).green());
    println!("  Blocked:     {}", style(report.backlog.blocked).red());
    if queued > 0 {
        println!("  Queued:      {} (merged on the next tick)", queued);
    }
    println!();

    println!("Breakers:");
    println!("  Iterations:           {}", report.iterations);
    println!("  Empty backlog ticks:  {}", report.empty_backlog_ticks);
    println!("  Consecutive failures: {}", report.max_consecutive_failures);
    println!("  Dispatches in window: {}", report.recent_dispatches);
    if report.stop_requested {
        println!("  {}", style("Stop requested").red().bold());
    }
    println!();

    println!(
        "Totals: {} ticks, {} completed, {} blocked, {} discovered",
        report.ticks, report.completed, report.blocked, report.discovered
    );

    if let Some(coverage) = &report.last_coverage {
        println!();
        println!("Last coverage:");
        for (category, measured) in &coverage.categories {
            let mark = if measured.passes() {
                style("ok").green()
            } else {
                style("below").red()
            };
            println!(
                "  {:<12} {:>6.1}% / {:>5.1}%  {}",
                category.to_string(),
                measured.percent,
                measured.threshold,
                mark
            );
        }
    }
    println!();

    Ok(())
}
