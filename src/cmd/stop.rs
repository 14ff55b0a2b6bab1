//! External stop request (`loopsmith stop`).

use anyhow::Result;
use std::path::Path;

use super::require_initialized;

pub fn cmd_stop(project_dir: &Path) -> Result<()> {
    use loopsmith::breakers::StopSignal;
    use loopsmith::init::get_loopsmith_dir;

    require_initialized(project_dir)?;

    let signal = StopSignal::new(get_loopsmith_dir(project_dir).join("stop"));
    if signal.is_raised() {
        println!("Stop already requested. Waiting for the loop to reach a tick boundary.");
        return Ok(());
    }
    signal.raise()?;

    println!(
        "{} Stop requested. The loop will exit after the current tick.",
        console::style("■").red().bold()
    );
    println!("Created: {}", signal.path().display());

    Ok(())
}
