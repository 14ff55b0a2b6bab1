//! Configuration view and validation (`loopsmith config`).

use anyhow::Result;
use std::path::Path;

use super::super::ConfigCommands;

pub fn cmd_config(project_dir: &Path, command: Option<ConfigCommands>) -> Result<()> {
    use loopsmith::loopsmith_config::{LoopsmithConfig, WORKER_CMD_ENV};

    let config = LoopsmithConfig::new(project_dir.to_path_buf())?;
    let config_path = config.config_file();

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Loopsmith Configuration");
            println!("=======================");
            println!();
            if config_path.exists() {
                println!("Config file: {}", config_path.display());
            } else {
                println!("No loopsmith.toml found at {}", config_path.display());
                println!("Using default configuration. Run 'loopsmith init' to write one.");
            }
            println!();
            print!("{}", config.toml.to_toml_string()?);
            println!();
            println!("Effective values (with env overrides):");
            println!("  project = \"{}\"", config.project_name());
            let worker = config.toml.worker_command();
            if std::env::var(WORKER_CMD_ENV).is_ok_and(|v| !v.trim().is_empty()) {
                println!("  worker.command = \"{}\" (from {})", worker, WORKER_CMD_ENV);
            } else {
                println!("  worker.command = \"{}\"", worker);
            }
            println!();
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            if !config_path.exists() {
                println!("No loopsmith.toml found. Using defaults (valid).");
                return Ok(());
            }

            let warnings = config.validate();
            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
    }

    Ok(())
}
