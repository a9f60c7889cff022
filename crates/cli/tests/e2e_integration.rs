//! End-to-end tests for the BlockMind agent runtime.
//!
//! These drive a full [`AgentRuntime`] (conversation loop, executor, behavior
//! tick and idle listener) against a scripted model and a small in-memory
//! world.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use blockmind_agent::AgentRuntime;
use blockmind_config::AppConfig;
use blockmind_config::Profile;
use blockmind_core::error::{ProviderError, WorldError};
use blockmind_core::lifecycle::Terminator;
use blockmind_core::message::{Role, Turn};
use blockmind_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use blockmind_core::world::{Entity, EntityKind, ItemStack, Position, Skill, SkillOutcome, World};
use blockmind_memory::FileHistoryStore;
use tokio_util::sync::CancellationToken;

// ── Mock Provider ────────────────────────────────────────────────────────

/// A mock provider that returns scripted responses in sequence.
struct ScriptedProvider {
    responses: Mutex<Vec<Result<ProviderResponse, ProviderError>>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    fn new(texts: &[&str]) -> Self {
        Self::scripted(texts.iter().map(|t| Ok(text_response(t))).collect())
    }

    fn scripted(responses: Vec<Result<ProviderResponse, ProviderError>>) -> Self {
        Self {
            responses: Mutex::new(responses),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let call = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request);
            requests.len()
        };
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            panic!("ScriptedProvider exhausted: call #{call}");
        }
        responses.remove(0)
    }
}

fn text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        content: text.to_string(),
        finish_reason: Some("stop".into()),
        model: "mock".into(),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
    }
}

// ── Mock World ───────────────────────────────────────────────────────────

/// One player named steve, optional hostiles, and a log of everything done.
#[derive(Default)]
struct FarmWorld {
    chats: Mutex<Vec<String>>,
    skills: Mutex<Vec<Skill>>,
    hostiles: Mutex<Vec<Entity>>,
    inventory: Mutex<Vec<ItemStack>>,
}

impl FarmWorld {
    fn chats(&self) -> Vec<String> {
        self.chats.lock().unwrap().clone()
    }

    fn skills(&self) -> Vec<Skill> {
        self.skills.lock().unwrap().clone()
    }

    fn spawn_zombie(&self) {
        self.hostiles.lock().unwrap().push(Entity {
            id: 99,
            name: "zombie".into(),
            kind: EntityKind::Hostile,
            position: Position::new(4.0, 64.0, 0.0),
        });
    }
}

#[async_trait::async_trait]
impl World for FarmWorld {
    fn username(&self) -> &str {
        "andy"
    }

    async fn chat(&self, message: &str) -> Result<(), WorldError> {
        self.chats.lock().unwrap().push(message.to_string());
        Ok(())
    }

    async fn stop_movement(&self) {}

    async fn stop_combat(&self) {}

    async fn stop_collection(&self) {}

    async fn position(&self) -> Position {
        Position::new(0.0, 64.0, 0.0)
    }

    async fn is_idle_world_state(&self) -> bool {
        true
    }

    async fn nearest_entity(&self, kind: EntityKind, max_distance: f64) -> Option<Entity> {
        if kind != EntityKind::Hostile {
            return None;
        }
        let origin = Position::new(0.0, 64.0, 0.0);
        self.hostiles
            .lock()
            .unwrap()
            .iter()
            .find(|e| e.position.distance_to(&origin) <= max_distance)
            .cloned()
    }

    async fn nearest_entity_any(&self, max_distance: f64) -> Option<Entity> {
        self.nearest_entity(EntityKind::Hostile, max_distance).await
    }

    async fn has_clear_path(&self, _entity: &Entity) -> bool {
        true
    }

    async fn nearest_block(&self, _name: &str, _range: f64) -> Option<Position> {
        None
    }

    async fn inventory(&self) -> Vec<ItemStack> {
        self.inventory.lock().unwrap().clone()
    }

    async fn health(&self) -> f32 {
        20.0
    }

    async fn look_at(&self, _position: Position) {}

    async fn look(&self, _yaw: f32, _pitch: f32) {}

    async fn run_skill(&self, skill: Skill, cancel: &CancellationToken) -> Result<SkillOutcome, WorldError> {
        self.skills.lock().unwrap().push(skill.clone());
        match skill {
            Skill::FollowPlayer { .. } | Skill::Stay => {
                cancel.cancelled().await;
                Ok(SkillOutcome {
                    success: true,
                    message: None,
                })
            }
            Skill::DefendSelf { .. } => {
                self.hostiles.lock().unwrap().clear();
                Ok(SkillOutcome::ok("Defeated the zombie."))
            }
            Skill::CollectBlocks { block, num } => {
                self.inventory.lock().unwrap().push(ItemStack {
                    name: block.clone(),
                    count: num,
                });
                Ok(SkillOutcome::ok(format!("Collected {num} {block}.")))
            }
            other => Ok(SkillOutcome::ok(format!("{} done.", other.name()))),
        }
    }
}

#[derive(Default)]
struct CountingTerminator(Mutex<Vec<String>>);

impl Terminator for CountingTerminator {
    fn terminate(&self, reason: &str) {
        self.0.lock().unwrap().push(reason.to_string());
    }
}

fn profile() -> Profile {
    let mut profile = Profile::sample("andy");
    profile.conversation_examples.clear();
    profile.coding_examples.clear();
    profile
}

fn config(data_dir: &std::path::Path) -> AppConfig {
    let mut config = AppConfig::default();
    config.data_dir = data_dir.to_path_buf();
    config.modes.disabled = vec!["idle_staring".into()];
    config
}

async fn runtime(
    provider: Arc<ScriptedProvider>,
    world: Arc<FarmWorld>,
    data_dir: &std::path::Path,
) -> (AgentRuntime, Arc<CountingTerminator>) {
    let terminator = Arc::new(CountingTerminator::default());
    let runtime = AgentRuntime::build(
        config(data_dir),
        profile(),
        world,
        provider,
        Arc::new(FileHistoryStore::new(data_dir)),
        terminator.clone(),
    )
    .await;
    (runtime, terminator)
}

// ── E2E: conversation drives the world ───────────────────────────────────

#[tokio::test(start_paused = true)]
async fn e2e_model_command_runs_a_skill_and_reports_back() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(ScriptedProvider::new(&[
        "Sure! !collectBlocks(\"oak_log\", 3) and nothing after",
        "Got 3 oak logs for you.",
    ]));
    let world = Arc::new(FarmWorld::default());
    let (runtime, _) = runtime(provider.clone(), world.clone(), dir.path()).await;
    runtime.start(false, None).await;

    runtime.on_chat("steve", "can you get some wood?").unwrap().await.unwrap();

    assert_eq!(
        world.chats(),
        vec![
            "Hello world! I am andy",
            "Sure!  *used collectBlocks*",
            "Got 3 oak logs for you.",
        ]
    );
    assert_eq!(
        world.skills(),
        vec![Skill::CollectBlocks {
            block: "oak_log".into(),
            num: 3
        }]
    );

    // The second prompt sees the command's output as a system turn and the
    // system prompt shows the new inventory.
    let second = &provider.requests()[1];
    assert!(second.turns.iter().any(|t| t.role == Role::System && t.content.contains("Collected 3 oak_log.")));
    assert!(second.system.contains("- oak_log: 3"));
    runtime.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn e2e_hallucinated_command_recovers() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(ScriptedProvider::new(&["!teleport(\"steve\")", "I can't teleport, sorry."]));
    let world = Arc::new(FarmWorld::default());
    let (runtime, _) = runtime(provider.clone(), world.clone(), dir.path()).await;

    runtime.on_chat("steve", "teleport to me").unwrap().await.unwrap();

    let turns = runtime.history().lock().await.turns();
    assert!(turns.contains(&Turn::system(
        "Command !teleport does not exist. Use !newAction to perform custom actions."
    )));
    assert_eq!(world.chats(), vec!["I can't teleport, sorry."]);
}

#[tokio::test(start_paused = true)]
async fn e2e_context_overflow_drops_the_oldest_turn() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(ScriptedProvider::scripted(vec![
        Ok(text_response("hi")),
        Ok(text_response("hello again")),
        Err(ProviderError::ContextLengthExceeded),
        Ok(text_response("still here")),
    ]));
    let world = Arc::new(FarmWorld::default());
    let (runtime, _) = runtime(provider.clone(), world.clone(), dir.path()).await;

    runtime.on_chat("steve", "hey").unwrap().await.unwrap();
    runtime.on_chat("steve", "you there?").unwrap().await.unwrap();
    runtime.on_chat("steve", "hello?").unwrap().await.unwrap();

    let requests = provider.requests();
    assert_eq!(requests[3].turns.len() + 1, requests[2].turns.len());
    assert_eq!(world.chats().last().map(String::as_str), Some("still here"));
}

// ── E2E: persistence ─────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn e2e_history_survives_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    {
        let provider = Arc::new(ScriptedProvider::new(&["Nice to meet you, steve!"]));
        let (runtime, _) = runtime(provider, Arc::new(FarmWorld::default()), dir.path()).await;
        runtime.on_chat("steve", "I'm steve").unwrap().await.unwrap();
        runtime.shutdown().await;
    }
    assert!(dir.path().join("andy").join("memory.json").exists());

    let provider = Arc::new(ScriptedProvider::new(&["Welcome back, steve."]));
    let world = Arc::new(FarmWorld::default());
    let (runtime, _) = runtime(provider.clone(), world, dir.path()).await;
    runtime.start(true, Some("You have restarted.")).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let first = &provider.requests()[0];
    assert_eq!(first.turns[0], Turn::user("steve: I'm steve"));
    assert_eq!(first.turns[1], Turn::assistant("Nice to meet you, steve!"));
    assert_eq!(first.turns[2], Turn::system("You have restarted."));
    runtime.shutdown().await;
}

// ── E2E: behaviors preempt and the task resumes ──────────────────────────

#[tokio::test(start_paused = true)]
async fn e2e_self_defense_interrupts_following_which_then_resumes() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(ScriptedProvider::new(&[]));
    let world = Arc::new(FarmWorld::default());
    let (runtime, terminator) = runtime(provider, world.clone(), dir.path()).await;
    runtime.start(false, None).await;

    let following = runtime.on_chat("steve", "!followPlayer(\"steve\", 3)").unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(runtime.agent().context().executor.resume_name().as_deref(), Some("followPlayer"));

    world.spawn_zombie();
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert!(world.chats().contains(&"Fighting zombie!".to_string()));
    let skills = world.skills();
    let follows = skills
        .iter()
        .filter(|s| matches!(s, Skill::FollowPlayer { .. }))
        .count();
    assert_eq!(follows, 2, "following should resume after the fight: {skills:?}");
    assert!(skills.contains(&Skill::DefendSelf { range: 9.0 }));
    assert_eq!(terminator.0.lock().unwrap().len(), 0);

    runtime.shutdown().await;
    following.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn e2e_restart_command_terminates_through_the_terminator() {
    let dir = tempfile::tempdir().unwrap();
    let (runtime, terminator) = runtime(
        Arc::new(ScriptedProvider::new(&[])),
        Arc::new(FarmWorld::default()),
        dir.path(),
    )
    .await;

    runtime.on_chat("steve", "!restart").unwrap().await.unwrap();

    assert_eq!(terminator.0.lock().unwrap().len(), 1);
}
