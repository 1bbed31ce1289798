//! `soldeploy plan`: show what a deployment would create, and in which order.

use anyhow::Result;
use clap::Args;
use colored::Colorize;

use super::CliContext;
use super::common::{connect, load_config};
use crate::solution::plan_solution;

/// Show the deploy order of a solution.
#[derive(Args, Debug)]
pub struct PlanCommand {
    /// Portal profile holding the solution
    #[arg(long, short)]
    source: String,

    /// Also print the dependency tree
    #[arg(long)]
    tree: bool,

    /// Solution item id
    #[arg(value_name = "SOLUTION_ID")]
    solution_id: String,
}

impl PlanCommand {
    /// Run the command.
    pub async fn execute(self, ctx: &CliContext) -> Result<()> {
        let config = load_config(ctx).await?;
        let portal = connect(&config, &self.source)?;
        let plan = plan_solution(&portal, &self.solution_id).await?;

        println!("{} {}", "Solution:".bold(), plan.title);
        let total: u32 = plan.steps.iter().map(|s| s.cost).sum();
        println!("{} item(s), about {} API call(s)\n", plan.steps.len(), total);
        for (index, step) in plan.steps.iter().enumerate() {
            println!("{:>3}. {} {} ({})", index + 1, step.item_id.cyan(), step.title, step.item_type.dimmed());
        }

        if !plan.passthrough.is_empty() {
            println!("\n{}", "Kept by reference:".yellow());
            for item in &plan.passthrough {
                println!("  {} ({})", item.item_id, item.item_type);
            }
        }

        if self.tree {
            println!("\n{}", "Dependencies:".bold());
            for tree in &plan.trees {
                print!("{tree}");
            }
        }
        Ok(())
    }
}
