//! MindChat CLI: the main entry point.
//!
//! Commands:
//! - `route`: route messages and print the composed system prompt
//! - `topics`: list catalog topics
//! - `build-anchors`: recompute and persist topic anchors
//! - `doctor`: diagnose model, catalog and anchors
//! - `config`: print the default configuration

use clap::{Parser, Subcommand};
use mindchat_core::ChatMode;
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "mindchat",
    about = "MindChat: offline counseling topic routing",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use this config file instead of ~/.mindchat/config.toml
    #[arg(short, long, global = true, env = "MINDCHAT_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Route messages through the topic router
    Route {
        /// Route a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Chat mode (plain_chat or counseling); defaults to the configured mode
        #[arg(long)]
        mode: Option<ChatMode>,
    },

    /// List the topics in the prompt catalog
    Topics,

    /// Recompute topic anchors and write the anchor file
    BuildAnchors,

    /// Diagnose system health
    Doctor,

    /// Print the default configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Route { message, mode } => commands::route::run(config_path, message, mode).await?,
        Commands::Topics => commands::topics::run(config_path).await?,
        Commands::BuildAnchors => commands::build_anchors::run(config_path).await?,
        Commands::Doctor => commands::doctor::run(config_path).await?,
        Commands::Config => commands::config_cmd::run(),
    }

    Ok(())
}
