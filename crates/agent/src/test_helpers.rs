//! Shared test doubles: a scripted provider, an in-memory world, and a rig
//! that wires the whole agent together against them.

use crate::action::ActionStager;
use crate::agent::Agent;
use crate::commands::{CommandContext, CommandRegistry};
use crate::executor::Executor;
use crate::history::History;
use crate::modes::ModeController;
use crate::prompter::Prompter;
use async_trait::async_trait;
use blockmind_config::{ExecutorConfig, Profile};
use blockmind_core::error::{ProviderError, WorldError};
use blockmind_core::event::EventBus;
use blockmind_core::lifecycle::Terminator;
use blockmind_core::provider::{
    EmbeddingRequest, EmbeddingResponse, Provider, ProviderRequest, ProviderResponse, Usage,
};
use blockmind_core::world::{Entity, EntityKind, ItemStack, Position, Skill, SkillOutcome, World};
use blockmind_memory::InMemoryHistoryStore;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// A mock provider that returns a sequence of scripted responses.
///
/// Each call to `complete` returns the next response in the queue, then the
/// fallback text if one was set. Panics if the queue runs dry without one.
pub struct SequentialMockProvider {
    responses: StdMutex<VecDeque<Result<ProviderResponse, ProviderError>>>,
    fallback: Option<String>,
    keywords: Vec<String>,
    latency: Option<Duration>,
    requests: StdMutex<Vec<ProviderRequest>>,
}

impl SequentialMockProvider {
    pub fn new(responses: Vec<ProviderResponse>) -> Self {
        Self::scripted(responses.into_iter().map(Ok).collect())
    }

    pub fn scripted(responses: Vec<Result<ProviderResponse, ProviderError>>) -> Self {
        Self {
            responses: StdMutex::new(responses.into()),
            fallback: None,
            keywords: Vec::new(),
            latency: None,
            requests: StdMutex::new(Vec::new()),
        }
    }

    pub fn with_fallback(mut self, text: &str) -> Self {
        self.fallback = Some(text.to_string());
        self
    }

    /// Embed each input as one dimension per keyword, 1.0 when the
    /// lowercased input contains it.
    pub fn with_keyword_embeddings(mut self, keywords: &[&str]) -> Self {
        self.keywords = keywords.iter().map(|k| k.to_lowercase()).collect();
        self
    }

    /// Sleep this long before answering each completion.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let call = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request);
            requests.len()
        };
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if let Some(next) = self.responses.lock().unwrap().pop_front() {
            return next;
        }
        match &self.fallback {
            Some(text) => Ok(make_text_response(text)),
            None => panic!("SequentialMockProvider: no more responses (call #{call})"),
        }
    }

    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse, ProviderError> {
        if self.keywords.is_empty() {
            return Err(ProviderError::NotConfigured("no embeddings scripted".into()));
        }
        let embeddings = request
            .inputs
            .iter()
            .map(|input| {
                let input = input.to_lowercase();
                self.keywords
                    .iter()
                    .map(|k| if input.contains(k.as_str()) { 1.0 } else { 0.0 })
                    .collect()
            })
            .collect();
        Ok(EmbeddingResponse {
            embeddings,
            model: request.model,
        })
    }
}

/// Create a simple text response.
pub fn make_text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        content: text.to_string(),
        finish_reason: Some("stop".into()),
        model: "mock-model".into(),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
    }
}

/// A small profile whose prompts make placeholder filling easy to assert.
pub fn test_profile(name: &str) -> Profile {
    Profile {
        name: name.to_string(),
        model: "mock-model".into(),
        conversing: "You are $NAME.\n$COMMAND_DOCS\n$EXAMPLES".into(),
        coding: "Write code as $NAME.\n$CODE_DOCS".into(),
        saving_memory: Profile::sample(name).saving_memory,
        conversation_examples: vec![],
        coding_examples: vec![],
    }
}

/// An in-memory world that records everything the agent does to it.
///
/// `Stay` and `FollowPlayer` block until cancelled, like the real skills.
/// A `stuck` world ignores cancellation in those skills so stop attempts
/// fail.
pub struct MockWorld {
    username: String,
    position: Position,
    health: f32,
    stuck: bool,
    failing: bool,
    inventory: StdMutex<Vec<ItemStack>>,
    entities: StdMutex<Vec<Entity>>,
    blocks: StdMutex<Vec<(String, Position)>>,
    chats: StdMutex<Vec<String>>,
    skills: StdMutex<Vec<Skill>>,
    looked_at: StdMutex<Vec<Position>>,
    glances: AtomicUsize,
    stop_calls: AtomicUsize,
}

impl MockWorld {
    pub fn new(username: &str) -> Self {
        Self {
            username: username.to_string(),
            position: Position::new(0.0, 64.0, 0.0),
            health: 20.0,
            stuck: false,
            failing: false,
            inventory: StdMutex::new(Vec::new()),
            entities: StdMutex::new(Vec::new()),
            blocks: StdMutex::new(Vec::new()),
            chats: StdMutex::new(Vec::new()),
            skills: StdMutex::new(Vec::new()),
            looked_at: StdMutex::new(Vec::new()),
            glances: AtomicUsize::new(0),
            stop_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_inventory(self, items: Vec<ItemStack>) -> Self {
        *self.inventory.lock().unwrap() = items;
        self
    }

    pub fn with_entities(self, entities: Vec<Entity>) -> Self {
        *self.entities.lock().unwrap() = entities;
        self
    }

    pub fn with_blocks(self, blocks: Vec<(&str, Position)>) -> Self {
        *self.blocks.lock().unwrap() = blocks.into_iter().map(|(n, p)| (n.to_string(), p)).collect();
        self
    }

    pub fn stuck(mut self) -> Self {
        self.stuck = true;
        self
    }

    /// Every skill returns a world error.
    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    pub fn add_entity(&self, entity: Entity) {
        self.entities.lock().unwrap().push(entity);
    }

    pub fn chats(&self) -> Vec<String> {
        self.chats.lock().unwrap().clone()
    }

    pub fn skills(&self) -> Vec<Skill> {
        self.skills.lock().unwrap().clone()
    }

    pub fn looked_at(&self) -> Vec<Position> {
        self.looked_at.lock().unwrap().clone()
    }

    pub fn glances(&self) -> usize {
        self.glances.load(Ordering::SeqCst)
    }

    /// Total number of `stop_*` calls.
    pub fn stop_calls(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }

    fn nearest(&self, max_distance: f64, filter: impl Fn(&Entity) -> bool) -> Option<Entity> {
        self.entities
            .lock()
            .unwrap()
            .iter()
            .filter(|e| filter(e) && e.position.distance_to(&self.position) <= max_distance)
            .min_by(|a, b| {
                a.position
                    .distance_to(&self.position)
                    .total_cmp(&b.position.distance_to(&self.position))
            })
            .cloned()
    }

    fn remove_entities(&self, filter: impl Fn(&Entity) -> bool) {
        self.entities.lock().unwrap().retain(|e| !filter(e));
    }
}

/// Build an entity for the mock world.
pub fn entity(id: u64, name: &str, kind: EntityKind, position: Position) -> Entity {
    Entity {
        id,
        name: name.to_string(),
        kind,
        position,
    }
}

#[async_trait]
impl World for MockWorld {
    fn username(&self) -> &str {
        &self.username
    }

    async fn chat(&self, message: &str) -> Result<(), WorldError> {
        self.chats.lock().unwrap().push(message.to_string());
        Ok(())
    }

    async fn stop_movement(&self) {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
    }

    async fn stop_combat(&self) {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
    }

    async fn stop_collection(&self) {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
    }

    async fn position(&self) -> Position {
        self.position
    }

    async fn is_idle_world_state(&self) -> bool {
        true
    }

    async fn nearest_entity(&self, kind: EntityKind, max_distance: f64) -> Option<Entity> {
        self.nearest(max_distance, |e| e.kind == kind)
    }

    async fn nearest_entity_any(&self, max_distance: f64) -> Option<Entity> {
        self.nearest(max_distance, |_| true)
    }

    async fn has_clear_path(&self, _entity: &Entity) -> bool {
        true
    }

    async fn nearest_block(&self, name: &str, range: f64) -> Option<Position> {
        self.blocks
            .lock()
            .unwrap()
            .iter()
            .filter(|(n, p)| n == name && p.distance_to(&self.position) <= range)
            .map(|(_, p)| *p)
            .next()
    }

    async fn inventory(&self) -> Vec<ItemStack> {
        self.inventory.lock().unwrap().clone()
    }

    async fn health(&self) -> f32 {
        self.health
    }

    async fn look_at(&self, position: Position) {
        self.looked_at.lock().unwrap().push(position);
    }

    async fn look(&self, _yaw: f32, _pitch: f32) {
        self.glances.fetch_add(1, Ordering::SeqCst);
    }

    async fn run_skill(&self, skill: Skill, cancel: &CancellationToken) -> Result<SkillOutcome, WorldError> {
        self.skills.lock().unwrap().push(skill.clone());
        if self.failing {
            return Err(WorldError::SkillFailed {
                skill: skill.name().to_string(),
                reason: "scripted failure".into(),
            });
        }
        let here = self.position;
        let outcome = match &skill {
            Skill::Stay | Skill::FollowPlayer { .. } => {
                if self.stuck {
                    std::future::pending::<()>().await;
                }
                cancel.cancelled().await;
                SkillOutcome { success: true, message: None }
            }
            Skill::CollectBlocks { block, num } => SkillOutcome::ok(format!("Collected {num} {block}.")),
            Skill::GoToPlayer { player, .. } => SkillOutcome::ok(format!("You have reached {player}.")),
            Skill::AttackEntity { entity_id } => {
                let id = *entity_id;
                self.remove_entities(|e| e.id == id);
                SkillOutcome::ok("Killed it.")
            }
            Skill::DefendSelf { range } => {
                let range = *range;
                self.remove_entities(|e| e.kind == EntityKind::Hostile && e.position.distance_to(&here) <= range);
                SkillOutcome::ok("Defended myself.")
            }
            Skill::PickupNearbyItems => {
                self.remove_entities(|e| e.kind == EntityKind::Item && e.position.distance_to(&here) <= 8.0);
                SkillOutcome::ok("Picked up items.")
            }
            Skill::PlaceBlock { block, .. } => {
                self.blocks.lock().unwrap().push((block.clone(), here));
                SkillOutcome::ok(format!("Placed {block}."))
            }
            other => SkillOutcome::ok(format!("{} done.", other.name())),
        };
        Ok(outcome)
    }
}

/// Counts terminations instead of exiting.
#[derive(Default)]
pub struct RecordingTerminator {
    reasons: StdMutex<Vec<String>>,
}

impl RecordingTerminator {
    pub fn count(&self) -> usize {
        self.reasons.lock().unwrap().len()
    }

    pub fn reasons(&self) -> Vec<String> {
        self.reasons.lock().unwrap().clone()
    }
}

impl Terminator for RecordingTerminator {
    fn terminate(&self, reason: &str) {
        self.reasons.lock().unwrap().push(reason.to_string());
    }
}

pub struct RigOptions {
    pub settings: ExecutorConfig,
    pub allow_insecure_coding: bool,
    pub max_messages: usize,
    pub disabled_modes: Vec<String>,
    pub stager_dir: Option<PathBuf>,
}

impl Default for RigOptions {
    fn default() -> Self {
        Self {
            settings: ExecutorConfig::default(),
            allow_insecure_coding: false,
            max_messages: 20,
            disabled_modes: Vec::new(),
            stager_dir: None,
        }
    }
}

/// A fully wired agent named "andy" over mock ports.
pub struct TestRig {
    pub provider: Arc<SequentialMockProvider>,
    pub world: Arc<MockWorld>,
    pub terminator: Arc<RecordingTerminator>,
    pub store: Arc<InMemoryHistoryStore>,
    pub events: Arc<EventBus>,
    pub prompter: Arc<Prompter>,
    pub history: Arc<Mutex<History>>,
    pub executor: Arc<Executor>,
    pub modes: Arc<Mutex<ModeController>>,
    pub commands: Arc<CommandRegistry>,
    pub ctx: CommandContext,
    pub agent: Arc<Agent>,
    dir: tempfile::TempDir,
}

impl TestRig {
    pub fn new(provider: SequentialMockProvider, world: MockWorld) -> Self {
        Self::with_options(provider, world, RigOptions::default())
    }

    pub fn with_options(provider: SequentialMockProvider, world: MockWorld, options: RigOptions) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let name = world.username().to_string();
        let provider = Arc::new(provider);
        let world = Arc::new(world);
        let terminator = Arc::new(RecordingTerminator::default());
        let store = Arc::new(InMemoryHistoryStore::new());
        let events = Arc::new(EventBus::default());
        let commands = Arc::new(CommandRegistry::with_builtins());

        let prompter = Arc::new(
            Prompter::new(test_profile(&name), provider.clone(), world.clone()).with_command_docs(commands.docs()),
        );
        let history = Arc::new(Mutex::new(
            History::new(&name, prompter.clone(), store.clone(), events.clone())
                .with_max_messages(options.max_messages),
        ));
        let stager_dir = options
            .stager_dir
            .unwrap_or_else(|| dir.path().join("action-code"));
        let executor = Arc::new(
            Executor::new(
                &name,
                world.clone(),
                prompter.clone(),
                history.clone(),
                events.clone(),
                terminator.clone(),
            )
            .with_stager(ActionStager::new(stager_dir))
            .with_settings(options.settings),
        );
        let modes = Arc::new(Mutex::new(
            ModeController::new(world.clone(), executor.clone(), events.clone())
                .with_disabled(&options.disabled_modes),
        ));
        let ctx = CommandContext {
            agent_name: name,
            world: world.clone(),
            executor: executor.clone(),
            modes: modes.clone(),
            history: history.clone(),
            terminator: terminator.clone(),
            allow_insecure_coding: options.allow_insecure_coding,
        };
        let agent = Arc::new(Agent::new(ctx.clone(), prompter.clone(), commands.clone(), events.clone()));

        Self {
            provider,
            world,
            terminator,
            store,
            events,
            prompter,
            history,
            executor,
            modes,
            commands,
            ctx,
            agent,
            dir,
        }
    }

    /// A stager writing into the rig's scratch directory.
    pub fn stager(&self) -> ActionStager {
        ActionStager::new(self.dir.path().join("scratch"))
    }
}
