//! CLI argument definitions using clap.

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::commands;

/// aigw - inspect and render AI Gateway configuration
#[derive(Parser, Debug)]
#[command(name = "aigw")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase output verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate routes, backends and security policies
    #[command(visible_alias = "check")]
    Validate(commands::validate::ValidateArgs),

    /// Explain how a route dispatches traffic
    Explain(commands::explain::ExplainArgs),

    /// Compute request costs for a route
    Cost(commands::cost::CostArgs),

    /// Render the filter configuration of a gateway
    Render(commands::render::RenderArgs),
}

impl Cli {
    /// Execute the CLI command.
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Validate(args) => commands::validate::execute(args, self.json).await,
            Commands::Explain(args) => commands::explain::execute(args, self.json).await,
            Commands::Cost(args) => commands::cost::execute(args, self.json).await,
            Commands::Render(args) => commands::render::execute(args, self.json).await,
        }
    }
}
