//! `blockmind agent`: Run one agent in the console world.
//!
//! Every stdin line is chat from the local player. `/die <message>` simulates
//! a death; `exit`, `quit` or EOF end the session.

use crate::console_world::ConsoleWorld;
use blockmind_agent::AgentRuntime;
use blockmind_config::{AppConfig, Profile};
use blockmind_core::lifecycle::ProcessTerminator;
use blockmind_memory::FileHistoryStore;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tracing::{info, warn};

/// The name the person at the keyboard chats under.
const LOCAL_PLAYER: &str = "player";

pub async fn run(
    profile_path: PathBuf,
    load_memory: bool,
    message: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    // Check for API key early: give a clear error
    if !config.has_api_key() && !config.providers.values().any(|p| p.api_key.is_some()) {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    BLOCKMIND_API_KEY = 'sk-...'");
        eprintln!("    OPENAI_API_KEY    = 'sk-...'");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let mut profile = Profile::load(&profile_path).map_err(|e| format!("Failed to load profile: {e}"))?;
    let router = blockmind_providers::build_from_config(&config);
    let (provider, model) = router
        .resolve(&profile.model)
        .ok_or("No default provider configured")?;
    profile.model = model;

    let name = profile.name.clone();
    let provider_name = config.default_provider.clone();
    let world = Arc::new(ConsoleWorld::new(&name, LOCAL_PLAYER));
    let store = Arc::new(FileHistoryStore::new(&config.data_dir));

    println!();
    println!("  BlockMind Agent - Console World");
    println!();
    println!("  Agent:     {name}");
    println!("  Provider:  {}", config.default_provider);
    println!("  Model:     {}", profile.model);
    println!("  Data dir:  {}", config.agent_dir(&name).display());
    println!();
    println!("  You are '{LOCAL_PLAYER}'. Type a message and press Enter.");
    println!("  Try !stats, !inventory or \"come here !goToPlayer(\\\"{LOCAL_PLAYER}\\\", 2)\".");
    println!("  Type 'exit' or Ctrl+D to quit.");
    println!();

    let model = profile.model.clone();
    let runtime = AgentRuntime::build(config, profile, world, provider, store, Arc::new(ProcessTerminator)).await;
    let handles = runtime.start(load_memory, message.as_deref()).await;
    info!(agent = %name, provider = %provider_name, model = %model, load_memory, "Agent started");

    let mut lines = BufReader::new(io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if matches!(line, "exit" | "quit" | "/exit" | "/quit") {
                    break;
                }
                if let Some(final_message) = line.strip_prefix("/die") {
                    info!(agent = %name, "Simulating death");
                    runtime.on_death(final_message.trim());
                    continue;
                }
                runtime.on_chat(LOCAL_PLAYER, line);
            }
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "Failed to read stdin");
                eprintln!("  [Input Error] {e}");
                break;
            }
        }
    }

    info!(agent = %name, "Shutting down agent");
    runtime.shutdown().await;
    for handle in handles {
        handle.await?;
    }

    println!();
    println!("  Goodbye!");
    println!();
    Ok(())
}
