//! Command-line interface for soldeploy.
//!
//! # Available Commands
//!
//! - `create` - Resolve items in a source portal and store them as a solution
//! - `deploy` - Recreate a stored solution in a destination portal
//! - `plan` - Show the deploy order and dependency tree of a solution
//! - `config` - Manage portal profiles and deploy settings
//!
//! # Workflow
//!
//! ```bash
//! # 1. Register the portals
//! soldeploy config set-portal source --url https://source.example.com/portal --username casey --token ...
//! soldeploy config set-portal dest --url https://dest.example.com/portal --username casey --token ...
//!
//! # 2. Build a solution from an app and everything it uses
//! soldeploy create --source source --title "Permit Review" 4f2e8a...
//!
//! # 3. Inspect, then deploy it
//! soldeploy plan --source source 9c1d...
//! soldeploy deploy --source source --dest dest 9c1d...
//! ```
//!
//! # Global Options
//!
//! - `--verbose` - Debug logging
//! - `--quiet` - Errors only, no progress bars
//! - `--no-progress` - Disable progress bars
//! - `--config` - Path to the config file

pub mod common;
mod config;
mod create;
mod deploy;
mod plan;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use crate::utils::is_progress_disabled;

/// Settings every command receives from the global flags.
#[derive(Debug, Clone, Default)]
pub struct CliContext {
    /// Explicit config file path
    pub config_path: Option<PathBuf>,
    /// Hide progress bars
    pub no_progress: bool,
    /// Print only the essential result
    pub quiet: bool,
}

impl CliContext {
    /// Progress bar honouring `--no-progress`, `--quiet` and
    /// `SOLDEPLOY_NO_PROGRESS`.
    #[must_use]
    pub fn progress_bar(&self) -> crate::utils::ProgressBar {
        if self.no_progress || self.quiet || is_progress_disabled() {
            crate::utils::ProgressBar::hidden()
        } else {
            crate::utils::ProgressBar::percent()
        }
    }
}

/// Resolve, templatize and redeploy GIS Solution item bundles.
#[derive(Parser)]
#[command(
    name = "soldeploy",
    about = "Copy GIS Solutions between portals",
    version,
    long_about = "soldeploy resolves an item and everything it references into a Solution of \
                  templates, then recreates those items, rewired to each other, in another portal."
)]
pub struct Cli {
    /// The subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only print errors and the command's result
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Path to the global config file
    #[arg(short, long, global = true, env = "SOLDEPLOY_CONFIG_PATH")]
    config: Option<PathBuf>,

    /// Disable progress bars
    #[arg(long, global = true)]
    no_progress: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a solution from items in a source portal.
    Create(create::CreateCommand),

    /// Deploy a solution into a destination portal.
    Deploy(deploy::DeployCommand),

    /// Show the deploy order of a solution without creating anything.
    Plan(plan::PlanCommand),

    /// Manage the global configuration.
    Config(config::ConfigCommand),
}

impl Cli {
    /// Install logging and run the selected command.
    ///
    /// # Errors
    ///
    /// Returns whatever the command fails with.
    pub async fn execute(self) -> Result<()> {
        self.init_logging();
        let ctx = self.build_context();
        match self.command {
            Commands::Create(cmd) => cmd.execute(&ctx).await,
            Commands::Deploy(cmd) => cmd.execute(&ctx).await,
            Commands::Plan(cmd) => cmd.execute(&ctx).await,
            Commands::Config(cmd) => cmd.execute(&ctx).await,
        }
    }

    /// Context derived from the global flags.
    #[must_use]
    pub fn build_context(&self) -> CliContext {
        CliContext {
            config_path: self.config.clone(),
            no_progress: self.no_progress,
            quiet: self.quiet,
        }
    }

    /// Log filter for the global flags: `--verbose` is debug, `--quiet` is
    /// error, otherwise `RUST_LOG` or info.
    #[must_use]
    pub fn log_filter(&self) -> EnvFilter {
        if self.verbose {
            EnvFilter::new("solution_deploy=debug,soldeploy=debug,warn")
        } else if self.quiet {
            EnvFilter::new("error")
        } else {
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
        }
    }

    fn init_logging(&self) {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(self.log_filter())
            .with_writer(std::io::stderr)
            .with_target(self.verbose)
            .try_init();
    }
}
