//! World trait: the abstraction over the live environment (the Capability Port).
//!
//! Everything that touches the simulated world goes through here: chat,
//! stopping in-flight activity, perception queries, and the domain skills a
//! staged action or a behavior can run. The runtime never owns the world; it
//! holds a shared `Arc<dyn World>` for the lifetime of the session.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use crate::error::WorldError;

/// A point in world coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn distance_to(&self, other: &Position) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    pub fn offset(&self, dx: f64, dy: f64, dz: f64) -> Position {
        Position::new(self.x + dx, self.y + dy, self.z + dz)
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "x: {:.2}, y: {:.2}, z: {:.2}", self.x, self.y, self.z)
    }
}

/// Coarse classification the behaviors care about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Player,
    Hostile,
    /// Adult passive mobs that drop food
    Huntable,
    /// A dropped item lying on the ground
    Item,
    Other,
}

/// Something with a position that isn't a block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: u64,
    pub name: String,
    pub kind: EntityKind,
    pub position: Position,
}

/// An inventory slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemStack {
    pub name: String,
    pub count: u32,
}

/// The closed set of domain actions the world can perform.
///
/// Action scripts, commands, and behaviors all bottom out in one of these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "skill", rename_all = "snake_case")]
pub enum Skill {
    GoToPlayer { player: String, closeness: f64 },
    FollowPlayer { player: String, distance: f64 },
    MoveAway { distance: f64 },
    GivePlayer { player: String, item: String, num: u32 },
    CollectBlocks { block: String, num: u32 },
    CraftRecipe { recipe: String, num: u32 },
    SmeltItem { item: String, num: u32 },
    PlaceBlock { block: String, position: Position },
    AttackNearest { mob: String },
    AttackEntity { entity_id: u64 },
    DefendSelf { range: f64 },
    PickupNearbyItems,
    GoToBed,
    Stay,
}

impl Skill {
    /// The camelCase name used in action scripts and logs.
    pub fn name(&self) -> &'static str {
        match self {
            Skill::GoToPlayer { .. } => "goToPlayer",
            Skill::FollowPlayer { .. } => "followPlayer",
            Skill::MoveAway { .. } => "moveAway",
            Skill::GivePlayer { .. } => "givePlayer",
            Skill::CollectBlocks { .. } => "collectBlocks",
            Skill::CraftRecipe { .. } => "craftRecipe",
            Skill::SmeltItem { .. } => "smeltItem",
            Skill::PlaceBlock { .. } => "placeBlock",
            Skill::AttackNearest { .. } => "attackNearest",
            Skill::AttackEntity { .. } => "attackEntity",
            Skill::DefendSelf { .. } => "defendSelf",
            Skill::PickupNearbyItems => "pickupNearbyItems",
            Skill::GoToBed => "goToBed",
            Skill::Stay => "stay",
        }
    }
}

/// What a skill reports back when it returns normally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillOutcome {
    pub success: bool,

    /// Text the skill wants the model to see ("Collected 3 oak_log.")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl SkillOutcome {
    pub fn ok(message: impl Into<String>) -> Self {
        Self { success: true, message: Some(message.into()) }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self { success: false, message: Some(message.into()) }
    }
}

/// The environment session the agent lives in.
///
/// Long-running skills must watch `cancel` and return promptly once it is
/// cancelled. Skills that cannot observe it are aborted by the `stop_*`
/// calls instead.
#[async_trait]
pub trait World: Send + Sync {
    /// The agent's own username in this world.
    fn username(&self) -> &str;

    /// Say something in public chat.
    async fn chat(&self, message: &str) -> std::result::Result<(), WorldError>;

    /// Abort any pathfinding in progress.
    async fn stop_movement(&self);

    /// Abort any fight in progress.
    async fn stop_combat(&self);

    /// Abort any block collection in progress.
    async fn stop_collection(&self);

    async fn position(&self) -> Position;

    /// True when the world itself has nothing queued for the agent.
    async fn is_idle_world_state(&self) -> bool;

    async fn nearest_entity(&self, kind: EntityKind, max_distance: f64) -> Option<Entity>;

    async fn nearest_entity_any(&self, max_distance: f64) -> Option<Entity>;

    async fn has_clear_path(&self, entity: &Entity) -> bool;

    async fn nearest_block(&self, name: &str, range: f64) -> Option<Position>;

    async fn inventory(&self) -> Vec<ItemStack>;

    async fn health(&self) -> f32;

    async fn look_at(&self, position: Position);

    async fn look(&self, yaw: f32, pitch: f32);

    /// Run one domain skill to completion or until `cancel` fires.
    async fn run_skill(
        &self,
        skill: Skill,
        cancel: &CancellationToken,
    ) -> std::result::Result<SkillOutcome, WorldError>;
}
