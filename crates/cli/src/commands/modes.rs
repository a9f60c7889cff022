//! `blockmind modes`: List the built-in behaviors in priority order.

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("BlockMind Modes (highest priority first)");
    println!("========================================");
    for (i, (name, description)) in blockmind_agent::catalog().into_iter().enumerate() {
        println!("  {}. {name:<16} {description}", i + 1);
    }
    println!();
    println!("  Switch one off at start with [modes] disabled = [\"name\"] in config.toml,");
    println!("  or at runtime with !setMode(\"name\", false).");
    Ok(())
}
