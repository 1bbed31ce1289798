//! `soldeploy config`: manage portal profiles and deploy settings.
//!
//! ```bash
//! soldeploy config                       # same as `config show`
//! soldeploy config path
//! soldeploy config init
//! soldeploy config set-portal dest --url https://dest.example.com/portal --username casey --token ...
//! soldeploy config remove-portal dest
//! ```

use anyhow::Result;
use clap::{Args, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};

use super::CliContext;
use crate::config::{GlobalConfig, PortalProfile};

/// Manage the global configuration.
#[derive(Args, Debug)]
pub struct ConfigCommand {
    /// Operation to perform
    #[command(subcommand)]
    command: Option<ConfigSubcommands>,
}

#[derive(Subcommand, Debug)]
enum ConfigSubcommands {
    /// Print the configuration with tokens masked (default).
    Show,

    /// Print the path of the configuration file in effect.
    Path,

    /// Write a configuration file with default deploy settings.
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Add or replace a portal profile.
    SetPortal {
        /// Profile name, used with --source and --dest
        name: String,

        /// Portal base url
        #[arg(long)]
        url: String,

        /// User that owns created content
        #[arg(long)]
        username: String,

        /// Access token
        #[arg(long)]
        token: Option<String>,
    },

    /// Remove a portal profile.
    RemovePortal {
        /// Profile name
        name: String,
    },
}

impl ConfigCommand {
    /// Run the command.
    pub async fn execute(self, ctx: &CliContext) -> Result<()> {
        let path = match &ctx.config_path {
            Some(path) => path.clone(),
            None => GlobalConfig::default_path()?,
        };
        match self.command {
            Some(ConfigSubcommands::Show) | None => show(&path).await,
            Some(ConfigSubcommands::Path) => {
                println!("{}", path.display());
                Ok(())
            }
            Some(ConfigSubcommands::Init {
                force,
            }) => init(&path, force).await,
            Some(ConfigSubcommands::SetPortal {
                name,
                url,
                username,
                token,
            }) => {
                set_portal(
                    &path,
                    name,
                    PortalProfile {
                        url,
                        username,
                        token,
                    },
                )
                .await
            }
            Some(ConfigSubcommands::RemovePortal {
                name,
            }) => remove_portal(&path, &name).await,
        }
    }
}

async fn show(path: &Path) -> Result<()> {
    let config = GlobalConfig::load_with_optional(Some(path.to_path_buf())).await?;
    println!("{}", "Global Configuration".bold());
    println!("Location: {}\n", path.display());
    if config.portals.is_empty() {
        println!("No portals configured.");
        println!("\n{}", "Tip:".yellow());
        println!("  soldeploy config set-portal <name> --url <portal url> --username <user> --token <token>");
    }
    println!("{}", toml::to_string_pretty(&config.masked())?);
    Ok(())
}

async fn init(path: &PathBuf, force: bool) -> Result<()> {
    if tokio::fs::try_exists(path).await.unwrap_or(false) && !force {
        println!("{} Config already exists at {}", "✗".red(), path.display());
        println!("  Use --force to overwrite");
        return Ok(());
    }
    GlobalConfig::default().save_to(path).await?;
    println!("{} Created config at {}", "✓".green(), path.display());
    Ok(())
}

async fn set_portal(path: &Path, name: String, profile: PortalProfile) -> Result<()> {
    let mut config = GlobalConfig::load_with_optional(Some(path.to_path_buf())).await?;
    let url = profile.url.clone();
    if config.portals.insert(name.clone(), profile).is_some() {
        println!("{} Replacing portal '{}'", "!".yellow(), name);
    }
    config.save_to(path).await?;
    println!("{} Portal '{}' → {}", "✓".green(), name.cyan(), url);
    Ok(())
}

async fn remove_portal(path: &Path, name: &str) -> Result<()> {
    let mut config = GlobalConfig::load_with_optional(Some(path.to_path_buf())).await?;
    if config.portals.remove(name).is_some() {
        config.save_to(path).await?;
        println!("{} Removed portal '{}'", "✓".green(), name);
    } else {
        println!("{} Portal '{}' is not configured", "✗".red(), name);
    }
    Ok(())
}
