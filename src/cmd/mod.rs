//! CLI command implementations.
//!
//! Each submodule owns one `Commands` variant:
//!
//! | Module    | Commands handled |
//! |-----------|------------------|
//! | `init`    | `Init`           |
//! | `run`     | `Run`            |
//! | `status`  | `Status`         |
//! | `stop`    | `Stop`           |
//! | `backlog` | `Backlog`        |
//! | `config`  | `Config`         |

pub mod backlog;
pub mod config;
pub mod init;
pub mod run;
pub mod status;
pub mod stop;

pub use backlog::cmd_backlog;
pub use config::cmd_config;
pub use init::cmd_init;
pub use run::cmd_run;
pub use status::cmd_status;
pub use stop::cmd_stop;

/// Bail unless `loopsmith init` has been run in `project_dir`.
pub fn require_initialized(project_dir: &std::path::Path) -> anyhow::Result<()> {
    if !loopsmith::init::is_initialized(project_dir) {
        anyhow::bail!("Project not initialized. Run 'loopsmith init' first.");
    }
    Ok(())
}
