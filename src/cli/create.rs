//! `soldeploy create`: build a solution from items in a source portal.

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::time::Duration;

use super::CliContext;
use super::common::{connect, load_config};
use crate::converters::ConverterRegistry;
use crate::solution::{CreateSolutionRequest, create_solution};
use crate::utils::ProgressBar;

/// Build a solution from one or more items.
#[derive(Args, Debug)]
pub struct CreateCommand {
    /// Portal profile to read the items from
    #[arg(long, short)]
    source: String,

    /// Title of the new solution item
    #[arg(long, short)]
    title: String,

    /// Tag for the solution item (repeatable)
    #[arg(long = "tag")]
    tags: Vec<String>,

    /// Folder id for the solution item
    #[arg(long)]
    folder: Option<String>,

    /// Items (or groups) to include; their dependencies are added automatically
    #[arg(required = true, value_name = "ITEM_ID")]
    items: Vec<String>,
}

impl CreateCommand {
    /// Run the command.
    pub async fn execute(self, ctx: &CliContext) -> Result<()> {
        let config = load_config(ctx).await?;
        let portal = connect(&config, &self.source)?;
        let registry = ConverterRegistry::with_defaults();

        let mut request = CreateSolutionRequest::new(self.title, self.items);
        request.tags = self.tags;
        request.folder_id = self.folder;
        request.resource_copy_delay = Duration::from_millis(config.deploy.resource_copy_delay_ms);
        request.max_parallel_copies = config.deploy.max_parallel_copies;

        let spinner = if ctx.no_progress || ctx.quiet {
            ProgressBar::hidden()
        } else {
            ProgressBar::new_spinner()
        };
        spinner.set_message(format!("Resolving {} item(s)", request.root_ids.len()));
        let result = create_solution(&portal, &portal, &registry, &request).await;
        spinner.finish_and_clear();
        let created = result?;

        if ctx.quiet {
            println!("{}", created.solution_id);
            return Ok(());
        }
        println!(
            "{} Created solution {} with {} template(s)",
            "✓".green(),
            created.solution_id.bold(),
            created.template_count
        );
        if !created.passthrough.is_empty() {
            println!("{}", "Kept by reference (not recreated on deploy):".yellow());
            for item in &created.passthrough {
                println!("  {} ({})", item.item_id, item.item_type);
            }
        }
        if let Some(thumbnail) = &created.thumbnail {
            println!("Thumbnail taken from {thumbnail}");
        }
        Ok(())
    }
}
