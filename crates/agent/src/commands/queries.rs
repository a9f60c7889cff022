//! Read-only commands. Their output also fills `$STATS` and `$INVENTORY`.

use super::{Command, CommandContext, CommandRegistry};
use crate::syntax::ArgValue;
use async_trait::async_trait;
use blockmind_core::error::CommandError;
use blockmind_core::world::World;

pub fn register(registry: &mut CommandRegistry) {
    registry.register(Box::new(Stats));
    registry.register(Box::new(Inventory));
    registry.register(Box::new(Modes));
}

pub async fn stats(world: &dyn World) -> String {
    let position = world.position().await;
    let health = world.health().await.round();
    format!("## Bot's Stats\n- Position: {position}\n- Health: {health} / 20")
}

pub async fn inventory(world: &dyn World) -> String {
    let mut res = String::from("INVENTORY");
    for item in world.inventory().await.into_iter().filter(|i| i.count > 0) {
        res.push_str(&format!("\n- {}: {}", item.name, item.count));
    }
    if res == "INVENTORY" {
        res.push_str(": none");
    }
    res
}

struct Stats;

#[async_trait]
impl Command for Stats {
    fn name(&self) -> &str {
        "!stats"
    }

    fn description(&self) -> &str {
        "Get your bot's location and health."
    }

    async fn perform(&self, ctx: &CommandContext, _args: &[ArgValue]) -> Result<Option<String>, CommandError> {
        Ok(Some(stats(ctx.world.as_ref()).await))
    }
}

struct Inventory;

#[async_trait]
impl Command for Inventory {
    fn name(&self) -> &str {
        "!inventory"
    }

    fn description(&self) -> &str {
        "Get your bot's inventory."
    }

    async fn perform(&self, ctx: &CommandContext, _args: &[ArgValue]) -> Result<Option<String>, CommandError> {
        Ok(Some(inventory(ctx.world.as_ref()).await))
    }
}

struct Modes;

#[async_trait]
impl Command for Modes {
    fn name(&self) -> &str {
        "!modes"
    }

    fn description(&self) -> &str {
        "Get all available modes and see which are on and off."
    }

    async fn perform(&self, ctx: &CommandContext, _args: &[ArgValue]) -> Result<Option<String>, CommandError> {
        Ok(Some(ctx.modes.lock().await.describe()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{MockWorld, SequentialMockProvider, TestRig};
    use blockmind_core::world::ItemStack;

    #[tokio::test]
    async fn empty_inventory_says_none() {
        let world = MockWorld::new("andy").with_inventory(vec![ItemStack { name: "dirt".into(), count: 0 }]);
        assert_eq!(inventory(&world).await, "INVENTORY: none");
    }

    #[tokio::test]
    async fn inventory_lists_stacks() {
        let world = MockWorld::new("andy").with_inventory(vec![
            ItemStack { name: "oak_log".into(), count: 3 },
            ItemStack { name: "torch".into(), count: 4 },
        ]);
        assert_eq!(inventory(&world).await, "INVENTORY\n- oak_log: 3\n- torch: 4");
    }

    #[tokio::test]
    async fn query_commands_run_through_the_registry() {
        let rig = TestRig::new(SequentialMockProvider::new(vec![]), MockWorld::new("andy"));

        let stats = rig.commands.execute(&rig.ctx, "!stats").await.unwrap().unwrap();
        assert_eq!(stats, "## Bot's Stats\n- Position: x: 0.00, y: 64.00, z: 0.00\n- Health: 20 / 20");

        let modes = rig.commands.execute(&rig.ctx, "!modes").await.unwrap().unwrap();
        assert!(modes.starts_with("Available Modes:\n- self_defense(ON)"));
    }
}
