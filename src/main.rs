//! soldeploy CLI entry point.
//!
//! Parses arguments, runs the command and turns errors into readable
//! messages with suggestions.

use anyhow::Result;
use clap::Parser;
use solution_deploy::cli;
use solution_deploy::core::error::user_friendly_error;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    match cli.execute().await {
        Ok(()) => Ok(()),
        Err(e) => {
            user_friendly_error(e).display();
            std::process::exit(1);
        }
    }
}
