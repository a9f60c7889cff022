//! `blockmind onboard`: First-time setup.

use blockmind_config::{AppConfig, Profile};

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");

    println!("BlockMind - First-Time Setup");
    println!("============================\n");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
        println!("Created config directory: {}", config_dir.display());
    } else {
        println!("  Config directory exists: {}", config_dir.display());
    }

    if config_path.exists() {
        println!("\nConfig already exists at: {}", config_path.display());
        println!("   Edit it manually or delete and re-run onboard.\n");
    } else {
        std::fs::write(&config_path, AppConfig::default_toml())?;
        println!("Created config.toml at: {}", config_path.display());
    }

    let profile_path = std::env::current_dir()?.join("andy.json");
    if profile_path.exists() {
        println!("  Profile exists: {}", profile_path.display());
    } else {
        let profile = serde_json::to_string_pretty(&Profile::sample("andy"))?;
        std::fs::write(&profile_path, profile)?;
        println!("Created sample profile: {}", profile_path.display());
    }

    println!("\nNext steps:");
    println!("   1. Set BLOCKMIND_API_KEY or edit {}", config_path.display());
    println!("   2. Run: blockmind agent --profile andy.json");
    println!("   3. Chat with the bot; try \"come here !goToPlayer(\\\"you\\\", 3)\"\n");

    Ok(())
}
