//! The autonomous loop (`loopsmith run`).

use anyhow::{Context, Result};
use std::path::PathBuf;

use super::super::Cli;
use super::require_initialized;

pub async fn cmd_run(cli: &Cli, project_dir: PathBuf, max_ticks: Option<u64>) -> Result<()> {
    use loopsmith::config::Config;
    use loopsmith::orchestrator::Orchestrator;
    use loopsmith::ui::LoopUI;
    use loopsmith::worker::workers_from_config;

    require_initialized(&project_dir)?;

    let config = Config::new(project_dir, cli.verbose)?;
    config.ensure_directories()?;

    for warning in config.loopsmith_config().validate() {
        eprintln!("{} {}", console::style("warning:").yellow().bold(), warning);
    }

    let orchestrator = Orchestrator::new(&config, workers_from_config(&config));
    let mut state = orchestrator
        .store()
        .load_or_recover()
        .context("Failed to load orchestrator state")?;

    let ui = LoopUI::new(cli.verbose);
    ui.print_header(&config.loopsmith_config().project_name(), &state);

    let result = orchestrator
        .run(&mut state, max_ticks, |outcome, state| ui.on_tick(outcome, state))
        .await;

    match result {
        Ok(summary) => {
            ui.finish(&summary);
            println!();
            println!("{}", console::style("Run summary").bold());
            println!("  Stopped:    {}", summary.reason);
            println!("  Ticks:      {}", summary.ticks);
            println!(
                "  Tasks:      {} completed, {} blocked ({} iterations total)",
                summary.completed, summary.blocked, summary.iterations
            );
            println!("  Discovered: {}", summary.discovered);
            if let Some(task) = &summary.active_task {
                println!(
                    "  Active:     {} [{}] criterion {}/{}",
                    task.title,
                    task.phase,
                    (task.step + 1).min(task.criteria),
                    task.criteria
                );
            }
            println!("  Next:       {}", summary.next_action);
            Ok(())
        }
        Err(e) => {
            ui.fail(&e.to_string());
            Err(e).context("Run failed")
        }
    }
}
