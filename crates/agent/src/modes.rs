//! The behavior scheduler ("mode controller").
//!
//! Behaviors are reactive rules checked once per tick in priority order.
//! A behavior that decides to act hands an action to the executor on a
//! spawned task and is marked active until that task reports back over a
//! channel; the tick itself never waits for the action.

use crate::action::skill_action;
use crate::executor::{ActionFn, Executor, action_fn};
use blockmind_core::event::{AgentEvent, EventBus};
use blockmind_core::world::{Entity, EntityKind, Position, Skill, World};
use chrono::Utc;
use rand::Rng;
use std::f32::consts::{FRAC_PI_4, TAU};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

const DEFEND_RANGE: f64 = 9.0;
const HUNT_RANGE: f64 = 8.0;
const ITEM_RANGE: f64 = 8.0;
const TORCH_RANGE: f64 = 6.0;
const STARE_RANGE: f64 = 10.0;

/// Who a behavior is allowed to preempt while the agent is busy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interrupt {
    /// Anything at all
    All,
    /// Any resumable task
    Defaults,
    /// Only the resumable task with this name
    Task(String),
}

/// Per-behavior state. Each variant carries only what its rule needs.
#[derive(Debug)]
pub enum Behavior {
    SelfDefense,
    Hunting,
    ItemCollecting {
        wait: Duration,
        prev_item: Option<u64>,
        noticed_at: Option<Instant>,
    },
    TorchPlacing,
    IdleStaring {
        staring: bool,
        last_entity: Option<u64>,
        next_change: Instant,
    },
}

impl Behavior {
    /// Look at the world and return an action to launch, if any.
    async fn update(&mut self, world: &dyn World) -> Option<ActionFn> {
        match self {
            Behavior::SelfDefense => {
                let enemy = world.nearest_entity(EntityKind::Hostile, DEFEND_RANGE).await?;
                if !world.has_clear_path(&enemy).await {
                    return None;
                }
                say(world, &format!("Fighting {}!", enemy.name)).await;
                Some(skill_action(Skill::DefendSelf { range: DEFEND_RANGE }))
            }
            Behavior::Hunting => {
                let prey = world.nearest_entity(EntityKind::Huntable, HUNT_RANGE).await?;
                if !world.has_clear_path(&prey).await {
                    return None;
                }
                Some(hunt(prey))
            }
            Behavior::ItemCollecting {
                wait,
                prev_item,
                noticed_at,
            } => {
                let item = match world.nearest_entity(EntityKind::Item, ITEM_RANGE).await {
                    Some(item) if Some(item.id) != *prev_item => item,
                    _ => {
                        *noticed_at = None;
                        return None;
                    }
                };
                if !world.has_clear_path(&item).await {
                    *noticed_at = None;
                    return None;
                }
                let noticed = *noticed_at.get_or_insert_with(Instant::now);
                if noticed.elapsed() <= *wait {
                    return None;
                }
                say(world, &format!("Picking up {}!", item.name)).await;
                *prev_item = Some(item.id);
                *noticed_at = None;
                Some(skill_action(Skill::PickupNearbyItems))
            }
            Behavior::TorchPlacing => {
                if world.nearest_block("torch", TORCH_RANGE).await.is_some() {
                    return None;
                }
                let torch = world
                    .inventory()
                    .await
                    .into_iter()
                    .find(|item| item.count > 0 && item.name.contains("torch"))?;
                let position = world.position().await;
                Some(skill_action(Skill::PlaceBlock {
                    block: torch.name,
                    position,
                }))
            }
            Behavior::IdleStaring {
                staring,
                last_entity,
                next_change,
            } => {
                let me = world.position().await;
                let in_view = world
                    .nearest_entity_any(STARE_RANGE)
                    .await
                    .filter(|e| e.name != "enderman" && e.position.distance_to(&me) < STARE_RANGE);
                let now = Instant::now();

                if let Some(entity) = &in_view {
                    if Some(entity.id) != *last_entity {
                        *staring = true;
                        *last_entity = Some(entity.id);
                        let delay = rand::rng().random_range(4000..5000);
                        *next_change = now + Duration::from_millis(delay);
                    }
                    if *staring {
                        world.look_at(head_of(entity)).await;
                    }
                } else {
                    *last_entity = None;
                }

                if now > *next_change {
                    let (stare, yaw, pitch, delay) = {
                        let mut rng = rand::rng();
                        (
                            rng.random_bool(0.3),
                            rng.random_range(0.0..TAU),
                            rng.random_range(-FRAC_PI_4..FRAC_PI_4),
                            rng.random_range(2000..12000),
                        )
                    };
                    *staring = stare;
                    if !stare {
                        world.look(yaw, pitch).await;
                    }
                    *next_change = now + Duration::from_millis(delay);
                }
                None
            }
        }
    }
}

fn hunt(prey: Entity) -> ActionFn {
    action_fn(move |ctx| {
        let prey = prey.clone();
        async move {
            ctx.chat(&format!("Hunting {}!", prey.name)).await?;
            crate::action::run_skill(&ctx, Skill::AttackEntity { entity_id: prey.id }).await?;
            Ok(())
        }
    })
}

fn head_of(entity: &Entity) -> Position {
    let height = if entity.kind == EntityKind::Player { 1.8 } else { 1.0 };
    entity.position.offset(0.0, height, 0.0)
}

async fn say(world: &dyn World, text: &str) {
    if let Err(e) = world.chat(text).await {
        warn!(error = %e, "Failed to send chat");
    }
}

/// A named, prioritized behavior and its switches.
#[derive(Debug)]
pub struct Mode {
    name: &'static str,
    description: &'static str,
    interrupts: Vec<Interrupt>,
    on: bool,
    paused: bool,
    /// Launch id of the action this mode is waiting on
    active: Option<u64>,
    behavior: Behavior,
}

impl Mode {
    fn new(name: &'static str, description: &'static str, interrupts: Vec<Interrupt>, behavior: Behavior) -> Self {
        Self {
            name,
            description,
            interrupts,
            on: true,
            paused: false,
            active: None,
            behavior,
        }
    }

    pub fn name(&self) -> &str {
        self.name
    }

    pub fn description(&self) -> &str {
        self.description
    }

    pub fn is_on(&self) -> bool {
        self.on
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    fn interrupts_all(&self) -> bool {
        self.interrupts.contains(&Interrupt::All)
    }

    fn may_interrupt(&self, resume_name: Option<&str>) -> bool {
        self.interrupts.iter().any(|i| match i {
            Interrupt::Defaults => true,
            Interrupt::Task(name) => Some(name.as_str()) == resume_name,
            Interrupt::All => false,
        })
    }
}

/// The five built-in behaviors, highest priority first.
fn default_modes() -> Vec<Mode> {
    let follow = || vec![Interrupt::Task("followPlayer".into())];
    vec![
        Mode::new(
            "self_defense",
            "Automatically attack nearby enemies. Interrupts other actions.",
            vec![Interrupt::All],
            Behavior::SelfDefense,
        ),
        Mode::new(
            "hunting",
            "Automatically hunt nearby animals when idle.",
            vec![Interrupt::Defaults],
            Behavior::Hunting,
        ),
        Mode::new(
            "item_collecting",
            "Automatically collect nearby items when idle.",
            follow(),
            Behavior::ItemCollecting {
                wait: Duration::from_secs(2),
                prev_item: None,
                noticed_at: None,
            },
        ),
        Mode::new(
            "torch_placing",
            "Automatically place torches when idle and there are no torches nearby.",
            follow(),
            Behavior::TorchPlacing,
        ),
        Mode::new(
            "idle_staring",
            "Non-functional animation to look around at entities when idle.",
            vec![],
            Behavior::IdleStaring {
                staring: false,
                last_entity: None,
                next_change: Instant::now(),
            },
        ),
    ]
}

/// Name and description of every built-in behavior, in priority order.
pub fn catalog() -> Vec<(&'static str, &'static str)> {
    default_modes().iter().map(|m| (m.name, m.description)).collect()
}

pub struct ModeController {
    modes: Vec<Mode>,
    world: Arc<dyn World>,
    executor: Arc<Executor>,
    events: Arc<EventBus>,
    finished_tx: mpsc::UnboundedSender<(usize, u64)>,
    finished_rx: mpsc::UnboundedReceiver<(usize, u64)>,
    next_launch: u64,
}

impl ModeController {
    pub fn new(world: Arc<dyn World>, executor: Arc<Executor>, events: Arc<EventBus>) -> Self {
        let (finished_tx, finished_rx) = mpsc::unbounded_channel();
        Self {
            modes: default_modes(),
            world,
            executor,
            events,
            finished_tx,
            finished_rx,
            next_launch: 0,
        }
    }

    /// Switch off the named behaviors. Unknown names are logged and ignored.
    pub fn with_disabled(mut self, names: &[String]) -> Self {
        for name in names {
            if !self.set_on(name, false) {
                warn!(mode = %name, "Cannot disable unknown mode");
            }
        }
        self
    }

    pub fn modes(&self) -> &[Mode] {
        &self.modes
    }

    pub fn exists(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn is_on(&self, name: &str) -> Option<bool> {
        self.get(name).map(|m| m.on)
    }

    /// Returns `false` when no mode has that name.
    pub fn set_on(&mut self, name: &str, on: bool) -> bool {
        match self.get_mut(name) {
            Some(mode) => {
                mode.on = on;
                true
            }
            None => false,
        }
    }

    pub fn pause(&mut self, name: &str) {
        if let Some(mode) = self.get_mut(name) {
            mode.paused = true;
        }
    }

    pub fn pause_all(&mut self) {
        for mode in &mut self.modes {
            mode.paused = true;
        }
    }

    pub fn unpause_all(&mut self) {
        for mode in &mut self.modes {
            if mode.paused {
                debug!(mode = mode.name, "Unpausing mode");
            }
            mode.paused = false;
        }
    }

    /// The mode whose action is currently running, if any.
    pub fn active_mode(&self) -> Option<&str> {
        self.modes.iter().find(|m| m.is_active()).map(|m| m.name)
    }

    pub fn describe(&self) -> String {
        let mut res = String::from("Available Modes:");
        for mode in &self.modes {
            let on = if mode.on { "ON" } else { "OFF" };
            res.push_str(&format!("\n- {}({on}): {}", mode.name, mode.description));
        }
        res
    }

    /// One scheduling pass.
    pub async fn tick(&mut self) {
        self.drain_finished();
        if self.executor.is_idle() {
            self.unpause_all();
        }

        for idx in 0..self.modes.len() {
            let mode = &self.modes[idx];
            let available = mode.interrupts_all() || self.executor.is_idle();
            let interruptible = self.executor.is_interruptible()
                && mode.may_interrupt(self.executor.resume_name().as_deref());

            if mode.on && !mode.paused && !mode.is_active() && (available || interruptible) {
                let world = self.world.clone();
                if let Some(func) = self.modes[idx].behavior.update(world.as_ref()).await {
                    self.launch(idx, func);
                }
            }
            if self.modes[idx].is_active() {
                break;
            }
        }
    }

    fn drain_finished(&mut self) {
        while let Ok((idx, launch)) = self.finished_rx.try_recv() {
            if let Some(mode) = self.modes.get_mut(idx) {
                if mode.active == Some(launch) {
                    mode.active = None;
                }
            }
        }
    }

    fn launch(&mut self, idx: usize, func: ActionFn) {
        // The new action preempts whatever another mode started.
        for mode in &mut self.modes {
            mode.active = None;
        }
        let launch = self.next_launch;
        self.next_launch += 1;

        let name = self.modes[idx].name;
        self.modes[idx].active = Some(launch);
        info!(mode = name, "Mode triggered");
        self.events.publish(AgentEvent::ModeTriggered {
            mode: name.to_string(),
            timestamp: Utc::now(),
        });

        let executor = self.executor.clone();
        let finished = self.finished_tx.clone();
        tokio::spawn(async move {
            let result = executor.execute(func, 0).await;
            debug!(mode = name, message = %result.message, "Mode finished executing");
            let _ = finished.send((idx, launch));
        });
    }

    fn get(&self, name: &str) -> Option<&Mode> {
        self.modes.iter().find(|m| m.name == name)
    }

    fn get_mut(&mut self, name: &str) -> Option<&mut Mode> {
        self.modes.iter_mut().find(|m| m.name == name)
    }
}
