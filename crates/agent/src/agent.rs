//! The conversation loop.
//!
//! [`Agent::handle_message`] takes one inbound chat line and either runs the
//! command a player typed or lets the model reply, executing any command the
//! model asks for and feeding the result back until it has nothing more to do.

use crate::commands::{CommandContext, CommandRegistry};
use crate::prompter::Prompter;
use crate::syntax;
use blockmind_core::event::{AgentEvent, EventBus};
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// The command whose preceding text is kept as context for code generation.
const CUSTOM_ACTION: &str = "!newAction";

pub struct Agent {
    ctx: CommandContext,
    /// Held while a message is recorded and while the model is consulted.
    /// Released around command execution so a later message can preempt a
    /// long-running command.
    conversation: Mutex<()>,
    prompter: Arc<Prompter>,
    commands: Arc<CommandRegistry>,
    events: Arc<EventBus>,
    max_iterations: usize,
}

impl Agent {
    pub fn new(
        ctx: CommandContext,
        prompter: Arc<Prompter>,
        commands: Arc<CommandRegistry>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            ctx,
            conversation: Mutex::new(()),
            prompter,
            commands,
            events,
            max_iterations: 5,
        }
    }

    /// Cap on model replies per inbound message.
    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max.max(1);
        self
    }

    pub fn name(&self) -> &str {
        &self.ctx.agent_name
    }

    pub fn context(&self) -> &CommandContext {
        &self.ctx
    }

    /// Handle one message from `source` (a player name or `"system"`).
    ///
    /// Messages are handled one at a time: a second message waits until the
    /// first one has been answered or is busy running a command.
    pub async fn handle_message(&self, source: &str, message: &str) {
        let turn = self.conversation.lock().await;
        self.events.publish(AgentEvent::MessageReceived {
            source: source.to_string(),
            preview: message.chars().take(80).collect(),
            timestamp: Utc::now(),
        });

        if !source.is_empty() && !message.is_empty() {
            self.ctx.history.lock().await.add(source, message).await;
        }

        if let Some(command) = syntax::contains_command(message) {
            drop(turn);
            self.run_user_command(source, message, &command).await;
            return;
        }

        self.converse(turn).await;

        if let Err(e) = self.ctx.history.lock().await.save().await {
            warn!(agent = %self.name(), error = %e, "Failed to save history");
        }
    }

    /// Commands typed by players run directly; the model never sees them
    /// except for the text leading up to `!newAction`.
    async fn run_user_command(&self, source: &str, message: &str, command: &str) {
        if !self.commands.exists(command) {
            self.chat(&format!("Command '{command}' does not exist.")).await;
            return;
        }
        self.chat(&format!("*{source} used {}*", command.trim_start_matches('!')))
            .await;

        let output = self.execute(command, message).await;

        if command == CUSTOM_ACTION {
            let _turn = self.conversation.lock().await;
            let context = message.find(command).map_or("", |i| message[..i].trim());
            self.ctx.history.lock().await.add(source, context).await;
        }
        if let Some(output) = output.filter(|o| !o.is_empty()) {
            self.chat(&output).await;
        }
    }

    async fn converse<'a>(&'a self, mut turn: MutexGuard<'a, ()>) {
        for iteration in 0..self.max_iterations {
            let turns = self.ctx.history.lock().await.turns();
            let reply = self.prompter.prompt_convo(&turns).await;

            let Some(command) = syntax::contains_command(&reply) else {
                debug!(iteration, "Purely conversational response");
                self.ctx.history.lock().await.add(self.name(), &reply).await;
                self.chat(&reply).await;
                break;
            };

            debug!(iteration, full = %reply, "Model replied with a command");
            let reply = syntax::truncate_command_message(&reply);
            self.ctx.history.lock().await.add(self.name(), reply).await;

            if !self.commands.exists(&command) {
                warn!(command = %command, "Agent hallucinated command");
                self.ctx
                    .history
                    .lock()
                    .await
                    .add(
                        "system",
                        &format!("Command {command} does not exist. Use !newAction to perform custom actions."),
                    )
                    .await;
                continue;
            }

            let pre = reply.find(command.as_str()).map_or("", |i| reply[..i].trim());
            let used = format!("*used {}*", command.trim_start_matches('!'));
            if pre.is_empty() {
                self.chat(&used).await;
            } else {
                self.chat(&format!("{pre}  {used}")).await;
            }

            drop(turn);
            let output = self.execute(&command, reply).await;
            info!(command = %command, output = ?output, "Agent executed command");
            turn = self.conversation.lock().await;

            match output.filter(|o| !o.is_empty()) {
                Some(output) => self.ctx.history.lock().await.add("system", &output).await,
                None => break,
            }
        }
    }

    /// Run the command in `text`. Failures come back as text so the model
    /// and the player can see them.
    async fn execute(&self, command: &str, text: &str) -> Option<String> {
        let started = Instant::now();
        let result = self.commands.execute(&self.ctx, text).await;
        self.events.publish(AgentEvent::CommandExecuted {
            name: command.to_string(),
            success: result.is_ok(),
            duration_ms: started.elapsed().as_millis() as u64,
            timestamp: Utc::now(),
        });
        match result {
            Ok(output) => output,
            Err(e) => {
                warn!(command, error = %e, "Command failed");
                Some(e.to_string())
            }
        }
    }

    /// The world turns every newline into a separate chat line.
    async fn chat(&self, message: &str) {
        let message = message.replace('\n', "  ");
        if let Err(e) = self.ctx.world.chat(&message).await {
            warn!(error = %e, "Failed to send chat");
        }
    }

    /// Stop whatever was running and let the model react to the death.
    pub async fn on_death(&self, final_message: &str) {
        info!(agent = %self.name(), final_message, "Agent died");
        self.ctx.executor.cancel_resume();
        self.ctx.executor.stop().await;
        self.handle_message(
            "system",
            &format!(
                "You died with the final message: '{final_message}'. Previous actions were stopped and you have respawned. Notify the user and perform any necessary actions."
            ),
        )
        .await;
    }
}
