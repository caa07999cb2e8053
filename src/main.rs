mod cli;
mod config;
mod context;
mod db;
mod embedding;
mod engine;
mod error;
mod memory;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "engram", version, about = "Conversational memory engine for local AI assistants")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Assemble and print the context bundle for a query
    Search {
        /// Query text
        query: String,
    },
    /// Show turn-store statistics
    Stats,
    /// Permanently delete all remembered turns
    Purge {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    /// Manage the embedding model
    Model {
        #[command(subcommand)]
        action: ModelAction,
    },
}

#[derive(Subcommand)]
enum ModelAction {
    /// Download the embedding model to ~/.engram/models/
    Download,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = config::EngramConfig::load()?;

    // Log to stderr so stdout stays clean for command output.
    let filter = EnvFilter::try_new(&config.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Search { query } => {
            cli::search::search(config, &query).await?;
        }
        Command::Stats => {
            cli::stats::stats(&config)?;
        }
        Command::Purge { yes } => {
            cli::purge::purge(&config, yes)?;
        }
        Command::Model { action } => match action {
            ModelAction::Download => {
                cli::model_download(&config.embedding).await?;
            }
        },
    }

    Ok(())
}
