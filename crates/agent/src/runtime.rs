//! Wires an [`Agent`] to its world and keeps the background loops running.
//!
//! Two loops run next to the conversation: the behavior tick, and a listener
//! that unpauses behaviors and resumes the remembered task whenever the
//! executor reports it went idle.

use crate::action::ActionStager;
use crate::agent::Agent;
use crate::commands::{CommandContext, CommandRegistry};
use crate::executor::Executor;
use crate::history::History;
use crate::modes::ModeController;
use crate::prompter::Prompter;
use blockmind_config::{AppConfig, Profile};
use blockmind_core::event::EventBus;
use blockmind_core::lifecycle::Terminator;
use blockmind_core::memory::HistoryStore;
use blockmind_core::provider::Provider;
use blockmind_core::world::World;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct AgentRuntime {
    agent: Arc<Agent>,
    profile: Profile,
    config: AppConfig,
    world: Arc<dyn World>,
    executor: Arc<Executor>,
    modes: Arc<Mutex<ModeController>>,
    history: Arc<Mutex<History>>,
    events: Arc<EventBus>,
    terminator: Arc<dyn Terminator>,
    shutdown: CancellationToken,
}

impl AgentRuntime {
    /// Build the whole agent stack for `profile`.
    ///
    /// Embeds the profile's examples, so this talks to the provider once.
    pub async fn build(
        config: AppConfig,
        profile: Profile,
        world: Arc<dyn World>,
        provider: Arc<dyn Provider>,
        store: Arc<dyn HistoryStore>,
        terminator: Arc<dyn Terminator>,
    ) -> Self {
        let name = profile.name.clone();
        let events = Arc::new(EventBus::default());
        let commands = Arc::new(CommandRegistry::with_builtins());

        let mut prompter = Prompter::new(profile.clone(), provider, world.clone())
            .with_temperature(config.default_temperature)
            .with_command_docs(commands.docs());
        prompter.init_examples().await;
        let prompter = Arc::new(prompter);

        let history = Arc::new(Mutex::new(
            History::new(&name, prompter.clone(), store, events.clone())
                .with_max_messages(config.history.max_messages),
        ));
        let executor = Arc::new(
            Executor::new(
                &name,
                world.clone(),
                prompter.clone(),
                history.clone(),
                events.clone(),
                terminator.clone(),
            )
            .with_stager(ActionStager::new(config.agent_dir(&name).join("action-code")))
            .with_settings(config.executor.clone()),
        );
        let modes = Arc::new(Mutex::new(
            ModeController::new(world.clone(), executor.clone(), events.clone())
                .with_disabled(&config.modes.disabled),
        ));
        let ctx = CommandContext {
            agent_name: name,
            world: world.clone(),
            executor: executor.clone(),
            modes: modes.clone(),
            history: history.clone(),
            terminator: terminator.clone(),
            allow_insecure_coding: config.allow_insecure_coding,
        };
        let agent = Arc::new(
            Agent::new(ctx, prompter, commands, events.clone())
                .with_max_iterations(config.conversation.max_iterations),
        );

        Self {
            agent,
            profile,
            config,
            world,
            executor,
            modes,
            history,
            events,
            terminator,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn agent(&self) -> &Arc<Agent> {
        &self.agent
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn modes(&self) -> &Arc<Mutex<ModeController>> {
        &self.modes
    }

    pub fn history(&self) -> &Arc<Mutex<History>> {
        &self.history
    }

    /// Restore state, start the background loops and greet.
    pub async fn start(&self, load_memory: bool, init_message: Option<&str>) -> Vec<JoinHandle<()>> {
        let name = self.agent.name().to_string();
        if load_memory {
            if let Err(e) = self.history.lock().await.load().await {
                warn!(agent = %name, error = %e, "Failed to load history");
            }
        }
        match self.profile.save_copy(&self.config.agent_dir(&name)) {
            Ok(path) => debug!(path = %path.display(), "Saved profile copy"),
            Err(e) => warn!(agent = %name, error = %e, "Failed to save profile copy"),
        }

        info!(agent = %name, "Agent spawned");
        self.executor.clear();
        let handles = vec![self.spawn_idle_listener(), self.spawn_tick_loop()];

        match init_message.filter(|m| !m.is_empty()) {
            Some(message) => {
                let agent = self.agent.clone();
                let message = message.to_string();
                tokio::spawn(async move { agent.handle_message("system", &message).await });
            }
            None => {
                if let Err(e) = self.world.chat(&format!("Hello world! I am {name}")).await {
                    warn!(error = %e, "Failed to greet");
                }
            }
        }
        handles
    }

    /// Route a chat line from the world. `None` when it was ignored.
    ///
    /// Each message gets its own task; [`Agent::handle_message`] orders them.
    pub fn on_chat(&self, username: &str, message: &str) -> Option<JoinHandle<()>> {
        if username == self.agent.name() {
            return None;
        }
        if self
            .config
            .conversation
            .ignored_prefixes
            .iter()
            .any(|p| message.starts_with(p.as_str()))
        {
            debug!(username, message, "Ignoring server message");
            return None;
        }
        info!(from = username, message, "Received message");

        let agent = self.agent.clone();
        let username = username.to_string();
        let message = message.to_string();
        Some(tokio::spawn(async move {
            agent.handle_message(&username, &message).await;
        }))
    }

    pub fn on_death(&self, final_message: &str) -> JoinHandle<()> {
        let agent = self.agent.clone();
        let final_message = final_message.to_string();
        tokio::spawn(async move { agent.on_death(&final_message).await })
    }

    /// Losing the world is fatal.
    pub fn on_disconnect(&self, reason: &str) {
        warn!(reason, "Disconnected from the world");
        self.terminator.terminate(&format!("disconnected: {reason}"));
    }

    /// Stop the background loops and whatever is executing.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.executor.cancel_resume();
        self.executor.stop().await;
        if let Err(e) = self.history.lock().await.save().await {
            warn!(error = %e, "Failed to save history on shutdown");
        }
    }

    fn spawn_idle_listener(&self) -> JoinHandle<()> {
        let mut rx = self.events.subscribe();
        let modes = self.modes.clone();
        let executor = self.executor.clone();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    event = rx.recv() => event,
                };
                match event {
                    Ok(event) if event.is_idle() => {
                        modes.lock().await.unpause_all();
                        let executor = executor.clone();
                        tokio::spawn(async move {
                            executor.execute_resume(None).await;
                        });
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => warn!(skipped, "Idle listener lagged"),
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    fn spawn_tick_loop(&self) -> JoinHandle<()> {
        let modes = self.modes.clone();
        let shutdown = self.shutdown.clone();
        let period = Duration::from_millis(self.config.modes.tick_ms);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => modes.lock().await.tick().await,
                }
            }
            debug!("Tick loop stopped");
        })
    }
}
