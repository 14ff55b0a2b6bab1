//! Project initialization (`loopsmith init`).

use anyhow::Result;
use std::path::Path;

pub fn cmd_init(project_dir: &Path) -> Result<()> {
    use loopsmith::init::init_project;

    let result = init_project(project_dir)?;

    if result.created {
        println!(
            "Initialized loopsmith project at {}",
            result.loopsmith_dir.display()
        );
        println!();
        println!("Created directory structure:");
        println!("  .loopsmith/");
        println!("  ├── loopsmith.toml  # Breakers, coverage thresholds, worker command");
        println!("  ├── audit/tasks/    # Archived tasks");
        println!("  └── logs/           # JSON log file");
        println!();
        println!("Next steps:");
        println!("  1. Set [worker] command in loopsmith.toml (or LOOPSMITH_WORKER_CMD)");
        println!("  2. Queue work with `loopsmith backlog add \"<title>\"`, or let discovery find it");
        println!("  3. Run `loopsmith run` to start the loop");
    } else {
        println!(
            "Loopsmith project already initialized at {}",
            result.loopsmith_dir.display()
        );
        if result.wrote_config {
            println!("Restored default loopsmith.toml.");
        }
        println!("Directory structure verified.");
    }

    Ok(())
}
