use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use loopsmith::errors::{exit_code_for, exit_codes};
use std::path::PathBuf;
use std::process::ExitCode;

mod cmd;

#[derive(Parser)]
#[command(name = "loopsmith")]
#[command(version, about = "Autonomous phase-gated development loop")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a loopsmith project
    Init,
    /// Start or resume the loop
    Run {
        /// Stop after this many ticks
        #[arg(long)]
        max_ticks: Option<u64>,
    },
    /// Show the active task, backlog and breaker counters
    Status {
        /// Print the status as JSON
        #[arg(long)]
        json: bool,
    },
    /// Ask a running loop to stop at the next tick boundary
    Stop,
    /// Inspect or add to the backlog
    Backlog {
        #[command(subcommand)]
        command: BacklogCommands,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum BacklogCommands {
    /// Add a work item
    Add {
        title: String,

        #[arg(short, long, default_value = "")]
        description: String,

        /// critical, high, medium, low or icebox
        #[arg(short, long, default_value = "medium")]
        priority: String,

        /// trivial, small, medium or large
        #[arg(short, long, default_value = "medium")]
        complexity: String,
    },
    /// List backlog items in promotion order
    List {
        /// Include done and blocked items
        #[arg(long)]
        all: bool,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    Show,
    Validate,
}

async fn dispatch(cli: &Cli) -> Result<()> {
    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    match &cli.command {
        Commands::Init => cmd::cmd_init(&project_dir)?,
        Commands::Run { max_ticks } => cmd::cmd_run(cli, project_dir, *max_ticks).await?,
        Commands::Status { json } => cmd::cmd_status(&project_dir, *json)?,
        Commands::Stop => cmd::cmd_stop(&project_dir)?,
        Commands::Backlog { command } => cmd::cmd_backlog(&project_dir, command.clone())?,
        Commands::Config { command } => cmd::cmd_config(&project_dir, command.clone())?,
    }

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let log_dir = cli
        .project_dir
        .clone()
        .or_else(|| std::env::current_dir().ok())
        .map(|dir| loopsmith::init::get_loopsmith_dir(&dir).join("logs"));
    let _log_guard = loopsmith::logging::init(cli.verbose, log_dir.as_deref());

    match dispatch(&cli).await {
        Ok(()) => ExitCode::from(exit_codes::SUCCESS as u8),
        Err(e) => {
            eprintln!("{} {:#}", console::style("Error:").red().bold(), e);
            ExitCode::from(exit_code_for(&e) as u8)
        }
    }
}
