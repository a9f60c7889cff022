//! A text-only world for running an agent from the terminal.
//!
//! There is one other player (the person at the keyboard), no mobs and no
//! blocks. Skills succeed after a short pause and are narrated on stdout, so
//! the conversation loop and the executor can be tried without a game
//! server.

use async_trait::async_trait;
use blockmind_core::error::WorldError;
use blockmind_core::world::{Entity, EntityKind, ItemStack, Position, Skill, SkillOutcome, World};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// How long a skill "takes" in the console.
const SKILL_DELAY: Duration = Duration::from_millis(500);

pub struct ConsoleWorld {
    username: String,
    player: String,
    position: Mutex<Position>,
    inventory: Mutex<Vec<ItemStack>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ConsoleWorld {
    pub fn new(username: impl Into<String>, player: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            player: player.into(),
            position: Mutex::new(Position::new(0.0, 64.0, 0.0)),
            inventory: Mutex::new(Vec::new()),
        }
    }

    fn add_items(&self, name: &str, count: u32) {
        let mut inventory = lock(&self.inventory);
        match inventory.iter_mut().find(|i| i.name == name) {
            Some(stack) => stack.count += count,
            None => inventory.push(ItemStack {
                name: name.to_string(),
                count,
            }),
        }
    }

    /// Remove up to `count` items, returning how many were taken.
    fn take_items(&self, name: &str, count: u32) -> u32 {
        let mut inventory = lock(&self.inventory);
        let Some(stack) = inventory.iter_mut().find(|i| i.name == name) else {
            return 0;
        };
        let taken = stack.count.min(count);
        stack.count -= taken;
        inventory.retain(|i| i.count > 0);
        taken
    }

    fn player_entity(&self) -> Entity {
        Entity {
            id: 1,
            name: self.player.clone(),
            kind: EntityKind::Player,
            position: lock(&self.position).offset(2.0, 0.0, 0.0),
        }
    }

    fn narrate(&self, text: &str) {
        println!("  [{}] {text}", self.username);
    }

    fn apply(&self, skill: Skill) -> Result<SkillOutcome, WorldError> {
        let outcome = match skill {
            Skill::GoToPlayer { player, .. } => {
                if player != self.player {
                    return Err(WorldError::UnknownTarget(player));
                }
                let target = self.player_entity().position.offset(-1.0, 0.0, 0.0);
                *lock(&self.position) = target;
                SkillOutcome::ok(format!("You have reached {player}."))
            }
            Skill::MoveAway { distance } => {
                let mut position = lock(&self.position);
                *position = position.offset(distance, 0.0, 0.0);
                SkillOutcome::ok(format!("Moved away to {position}."))
            }
            Skill::GivePlayer { player, item, num } => match self.take_items(&item, num) {
                0 => SkillOutcome::failed(format!("You have no {item} to give.")),
                given => SkillOutcome::ok(format!("Gave {given} {item} to {player}.")),
            },
            Skill::CollectBlocks { block, num } => {
                self.add_items(&block, num);
                SkillOutcome::ok(format!("Collected {num} {block}."))
            }
            Skill::CraftRecipe { recipe, num } => {
                self.add_items(&recipe, num);
                SkillOutcome::ok(format!("Successfully crafted {recipe}, you now have {num} {recipe}."))
            }
            Skill::SmeltItem { item, num } => {
                self.add_items(&item, num);
                SkillOutcome::ok(format!("Successfully smelted {num} {item}."))
            }
            Skill::PlaceBlock { block, position } => match self.take_items(&block, 1) {
                0 => SkillOutcome::failed(format!("Don't have any {block} to place.")),
                _ => SkillOutcome::ok(format!("Placed {block} at {position}.")),
            },
            Skill::AttackNearest { mob } => SkillOutcome::failed(format!("Could not find any {mob} to attack.")),
            Skill::AttackEntity { .. } | Skill::DefendSelf { .. } => SkillOutcome::ok("No enemies nearby."),
            Skill::PickupNearbyItems => SkillOutcome::ok("Picked up 0 items."),
            Skill::GoToBed => SkillOutcome::failed("Could not find a bed to sleep in."),
            Skill::FollowPlayer { .. } | Skill::Stay => SkillOutcome {
                success: true,
                message: None,
            },
        };
        Ok(outcome)
    }
}

#[async_trait]
impl World for ConsoleWorld {
    fn username(&self) -> &str {
        &self.username
    }

    async fn chat(&self, message: &str) -> Result<(), WorldError> {
        println!("  {} > {message}", self.username);
        Ok(())
    }

    async fn stop_movement(&self) {}

    async fn stop_combat(&self) {}

    async fn stop_collection(&self) {}

    async fn position(&self) -> Position {
        *lock(&self.position)
    }

    async fn is_idle_world_state(&self) -> bool {
        true
    }

    async fn nearest_entity(&self, kind: EntityKind, max_distance: f64) -> Option<Entity> {
        let player = self.player_entity();
        let close = player.position.distance_to(&*lock(&self.position)) <= max_distance;
        (kind == EntityKind::Player && close).then_some(player)
    }

    async fn nearest_entity_any(&self, max_distance: f64) -> Option<Entity> {
        self.nearest_entity(EntityKind::Player, max_distance).await
    }

    async fn has_clear_path(&self, _entity: &Entity) -> bool {
        true
    }

    async fn nearest_block(&self, _name: &str, _range: f64) -> Option<Position> {
        None
    }

    async fn inventory(&self) -> Vec<ItemStack> {
        lock(&self.inventory).clone()
    }

    async fn health(&self) -> f32 {
        20.0
    }

    async fn look_at(&self, _position: Position) {}

    async fn look(&self, _yaw: f32, _pitch: f32) {}

    async fn run_skill(&self, skill: Skill, cancel: &CancellationToken) -> Result<SkillOutcome, WorldError> {
        self.narrate(&format!("{} ...", skill.name()));
        if matches!(skill, Skill::FollowPlayer { .. } | Skill::Stay) {
            cancel.cancelled().await;
            return self.apply(skill);
        }
        tokio::select! {
            _ = cancel.cancelled() => Ok(SkillOutcome::failed("Interrupted.")),
            _ = tokio::time::sleep(SKILL_DELAY) => self.apply(skill),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn collecting_then_giving_moves_items() {
        let world = ConsoleWorld::new("andy", "steve");
        let cancel = CancellationToken::new();

        world
            .run_skill(Skill::CollectBlocks { block: "oak_log".into(), num: 4 }, &cancel)
            .await
            .unwrap();
        let outcome = world
            .run_skill(
                Skill::GivePlayer {
                    player: "steve".into(),
                    item: "oak_log".into(),
                    num: 3,
                },
                &cancel,
            )
            .await
            .unwrap();

        assert_eq!(outcome.message.as_deref(), Some("Gave 3 oak_log to steve."));
        assert_eq!(world.inventory().await, vec![ItemStack { name: "oak_log".into(), count: 1 }]);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_player_is_an_error() {
        let world = ConsoleWorld::new("andy", "steve");
        let err = world
            .run_skill(
                Skill::GoToPlayer {
                    player: "alex".into(),
                    closeness: 3.0,
                },
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, WorldError::UnknownTarget(name) if name == "alex"));
    }

    #[tokio::test(start_paused = true)]
    async fn follow_waits_for_cancellation() {
        let world = std::sync::Arc::new(ConsoleWorld::new("andy", "steve"));
        let cancel = CancellationToken::new();
        let following = {
            let world = world.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                world
                    .run_skill(
                        Skill::FollowPlayer {
                            player: "steve".into(),
                            distance: 3.0,
                        },
                        &cancel,
                    )
                    .await
            })
        };
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(!following.is_finished());

        cancel.cancel();
        assert!(following.await.unwrap().unwrap().success);
    }

    #[tokio::test]
    async fn the_player_is_visible_nearby() {
        let world = ConsoleWorld::new("andy", "steve");
        let player = world.nearest_entity(EntityKind::Player, 10.0).await.unwrap();
        assert_eq!(player.name, "steve");
        assert!(world.nearest_entity(EntityKind::Hostile, 10.0).await.is_none());
    }
}
