//! BlockMind CLI: the main entry point.
//!
//! Commands:
//! - `onboard`: Write the default config and a sample profile
//! - `agent`  : Run an agent against the console world
//! - `modes`  : List the built-in behaviors

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod console_world;

#[derive(Parser)]
#[command(
    name = "blockmind",
    about = "BlockMind - an LLM-driven Minecraft-style agent runtime",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the default config and a sample profile
    Onboard,

    /// Run an agent; stdin lines are chat from the local player
    Agent {
        /// Path to the agent's profile JSON
        #[arg(short, long, default_value = "andy.json")]
        profile: PathBuf,

        /// Restore the saved conversation history
        #[arg(long)]
        load_memory: bool,

        /// First message handed to the agent instead of the greeting
        #[arg(short, long)]
        message: Option<String>,
    },

    /// List the built-in behaviors
    Modes,
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

    match cli.command {
        Commands::Onboard => commands::onboard::run().await?,
        Commands::Agent {
            profile,
            load_memory,
            message,
        } => commands::agent::run(profile, load_memory, message).await?,
        Commands::Modes => commands::modes::run().await?,
    }

    Ok(())
}
