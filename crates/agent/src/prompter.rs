//! Prompt assembly and model calls.
//!
//! The prompter owns the profile's templates, fills their `$PLACEHOLDERS`,
//! and sends the result to the provider.

use crate::action;
use crate::commands::queries;
use crate::examples::Examples;
use blockmind_config::Profile;
use blockmind_core::error::ProviderError;
use blockmind_core::message::{Turn, stringify_turns};
use blockmind_core::provider::{Provider, ProviderRequest};
use blockmind_core::world::World;
use regex_lite::Regex;
use std::sync::{Arc, LazyLock};
use tracing::{debug, info, warn};

/// Reply used when the model can't be reached.
pub const DISCONNECTED_REPLY: &str = "My brain disconnected, try again.";

const STOP_SEQUENCE: &str = "***";

static PLACEHOLDER_RE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\$[A-Z_]+").ok());

pub struct Prompter {
    profile: Profile,
    provider: Arc<dyn Provider>,
    model: String,
    embedding_model: String,
    temperature: f32,
    world: Arc<dyn World>,
    command_docs: String,
    convo_examples: Examples,
    coding_examples: Examples,
}

impl Prompter {
    pub fn new(profile: Profile, provider: Arc<dyn Provider>, world: Arc<dyn World>) -> Self {
        let embedding_model = blockmind_providers::DEFAULT_EMBEDDING_MODEL.to_string();
        Self {
            model: profile.model.clone(),
            convo_examples: Examples::new(provider.clone(), embedding_model.clone()),
            coding_examples: Examples::new(provider.clone(), embedding_model.clone()),
            profile,
            provider,
            embedding_model,
            temperature: 0.7,
            world,
            command_docs: String::new(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_command_docs(mut self, docs: impl Into<String>) -> Self {
        self.command_docs = docs.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.profile.name
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Embed both example sets. Call once before sharing the prompter.
    pub async fn init_examples(&mut self) {
        info!("Loading examples...");
        let mut convo = Examples::new(self.provider.clone(), self.embedding_model.clone());
        let mut coding = Examples::new(self.provider.clone(), self.embedding_model.clone());
        futures::join!(
            convo.load(self.profile.conversation_examples.clone()),
            coding.load(self.profile.coding_examples.clone()),
        );
        self.convo_examples = convo;
        self.coding_examples = coding;
        info!(
            conversation = self.convo_examples.len(),
            coding = self.coding_examples.len(),
            "Examples loaded"
        );
    }

    pub async fn prompt_convo(&self, turns: &[Turn]) -> String {
        let system = self
            .replace_strings(&self.profile.conversing, turns, Some(&self.convo_examples), None, &[])
            .await;
        self.send_request(turns, &system).await
    }

    pub async fn prompt_coding(&self, turns: &[Turn]) -> String {
        let system = self
            .replace_strings(&self.profile.coding, turns, Some(&self.coding_examples), None, &[])
            .await;
        self.send_request(turns, &system).await
    }

    /// Fold `to_summarize` into `prev_memory`. Errors are returned so the
    /// caller can keep the old memory instead of storing a failure reply.
    pub async fn prompt_mem_saving(
        &self,
        prev_memory: &str,
        to_summarize: &[Turn],
    ) -> Result<String, ProviderError> {
        let system = self
            .replace_strings(&self.profile.saving_memory, &[], None, Some(prev_memory), to_summarize)
            .await;
        self.try_send(&[], &system).await
    }

    /// Send and never fail: any error becomes [`DISCONNECTED_REPLY`].
    pub async fn send_request(&self, turns: &[Turn], system: &str) -> String {
        match self.try_send(turns, system).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "Model request failed");
                DISCONNECTED_REPLY.to_string()
            }
        }
    }

    /// Drop the oldest turn and retry while the context is too large.
    async fn try_send(&self, turns: &[Turn], system: &str) -> Result<String, ProviderError> {
        let mut turns = turns;
        loop {
            let request = ProviderRequest {
                model: self.model.clone(),
                system: system.to_string(),
                turns: turns.to_vec(),
                temperature: self.temperature,
                max_tokens: None,
                stop: vec![STOP_SEQUENCE.to_string()],
            };
            debug!(model = %self.model, turns = turns.len(), "Awaiting model response");
            match self.provider.complete(request).await {
                Ok(response) => return Ok(response.content),
                Err(ProviderError::ContextLengthExceeded) if turns.len() > 1 => {
                    info!(turns = turns.len(), "Context length exceeded, trying again with shorter context");
                    turns = &turns[1..];
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn replace_strings(
        &self,
        template: &str,
        turns: &[Turn],
        examples: Option<&Examples>,
        prev_memory: Option<&str>,
        to_summarize: &[Turn],
    ) -> String {
        let mut prompt = template.replace("$NAME", self.name());

        if prompt.contains("$STATS") {
            let stats = queries::stats(self.world.as_ref()).await;
            prompt = prompt.replace("$STATS", &stats);
        }
        if prompt.contains("$INVENTORY") {
            let inventory = queries::inventory(self.world.as_ref()).await;
            prompt = prompt.replace("$INVENTORY", &inventory);
        }
        if prompt.contains("$COMMAND_DOCS") {
            prompt = prompt.replace("$COMMAND_DOCS", &self.command_docs);
        }
        if prompt.contains("$CODE_DOCS") {
            prompt = prompt.replace("$CODE_DOCS", &action::code_docs());
        }
        if let Some(examples) = examples {
            if prompt.contains("$EXAMPLES") {
                let rendered = examples.create_example_message(turns).await;
                prompt = prompt.replace("$EXAMPLES", &rendered);
            }
        }
        if prompt.contains("$MEMORY") {
            let memory = prev_memory.filter(|m| !m.is_empty()).unwrap_or("None.");
            prompt = prompt.replace("$MEMORY", memory);
        }
        if prompt.contains("$TO_SUMMARIZE") {
            prompt = prompt.replace("$TO_SUMMARIZE", &stringify_turns(to_summarize));
        }

        if let Some(re) = PLACEHOLDER_RE.as_ref() {
            let remaining: Vec<&str> = re.find_iter(&prompt).map(|m| m.as_str()).collect();
            if !remaining.is_empty() {
                warn!(placeholders = %remaining.join(", "), "Unknown prompt placeholders");
            }
        }
        prompt
    }
}
