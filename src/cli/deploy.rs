//! `soldeploy deploy`: recreate a stored solution in a destination portal.

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use serde_json::{Value, json};

use super::CliContext;
use super::common::{connect, folder_title, load_config, parse_assignment};
use crate::converters::ConverterRegistry;
use crate::deploy::DeployProgress;
use crate::solution::{DeploySolutionRequest, deploy_solution, load_solution};
use crate::templating::TemplateDictionary;

/// Deploy a solution.
#[derive(Args, Debug)]
pub struct DeployCommand {
    /// Portal profile holding the solution
    #[arg(long, short)]
    source: String,

    /// Portal profile to deploy into
    #[arg(long, short)]
    dest: String,

    /// Title of the destination folder (default: solution title and time)
    #[arg(long)]
    folder_title: Option<String>,

    /// Extent for maps, as JSON `[[xmin,ymin],[xmax,ymax]]`
    #[arg(long, value_parser = parse_extent)]
    extent: Option<Value>,

    /// Extra dictionary entry, `key=value` (repeatable)
    #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_set)]
    set: Vec<(String, Value)>,

    /// Print the created items as JSON
    #[arg(long)]
    json: bool,

    /// Solution item id
    #[arg(value_name = "SOLUTION_ID")]
    solution_id: String,
}

fn parse_set(raw: &str) -> Result<(String, Value), String> {
    parse_assignment(raw).map_err(|e| e.to_string())
}

fn parse_extent(raw: &str) -> Result<Value, String> {
    let value: Value = serde_json::from_str(raw).map_err(|e| format!("invalid extent: {e}"))?;
    if value.as_array().is_some_and(|corners| corners.len() == 2) {
        Ok(value)
    } else {
        Err("extent must be [[xmin,ymin],[xmax,ymax]]".to_string())
    }
}

impl DeployCommand {
    /// Run the command.
    pub async fn execute(self, ctx: &CliContext) -> Result<()> {
        let config = load_config(ctx).await?;
        let source = connect(&config, &self.source)?;
        let destination = connect(&config, &self.dest)?;
        let username = config.portal(&self.dest)?.username.clone();
        let registry = ConverterRegistry::with_defaults();

        let folder_title = match self.folder_title {
            Some(title) => title,
            None => {
                let solution = load_solution(&source, &self.solution_id).await?;
                folder_title(config.deploy.default_folder_prefix.as_deref(), &solution.metadata.title)
            }
        };

        let mut dictionary = TemplateDictionary::new();
        for (key, value) in self.set {
            dictionary.seed(&key, value);
        }

        let request = DeploySolutionRequest {
            solution_id: self.solution_id,
            folder_title,
            username,
            extent: self.extent,
            options: config.deploy.options(None),
        };

        let bar = ctx.progress_bar();
        bar.set_message("Starting");
        let on_progress: &(dyn Fn(&DeployProgress) + Send + Sync) =
            &|progress: &DeployProgress| bar.update(progress);
        let result =
            deploy_solution(&source, &destination, &registry, &request, &mut dictionary, Some(on_progress)).await;
        match result {
            Ok(deployed) => {
                bar.finish_and_clear();
                if self.json {
                    let items: Vec<Value> = deployed
                        .items
                        .iter()
                        .map(|i| json!({"sourceId": i.source_id, "itemId": i.item_id, "type": i.item_type}))
                        .collect();
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&json!({
                            "solutionId": deployed.solution_id,
                            "folderId": deployed.folder_id,
                            "items": items,
                        }))?
                    );
                } else if ctx.quiet {
                    println!("{}", deployed.solution_id);
                } else {
                    println!(
                        "{} Deployed {} item(s) into folder {}",
                        "✓".green(),
                        deployed.items.len(),
                        deployed.folder_id.bold()
                    );
                    for item in &deployed.items {
                        println!("  {} → {} ({})", item.source_id, item.item_id.cyan(), item.item_type);
                    }
                    println!("Deployed solution: {}", deployed.solution_id.bold());
                }
                Ok(())
            }
            Err(failure) => {
                bar.finish_and_clear();
                let created: Vec<&String> = dictionary.keys().collect();
                tracing::debug!("Dictionary at failure has {} root(s): {:?}", created.len(), created);
                Err(failure.into())
            }
        }
    }
}
