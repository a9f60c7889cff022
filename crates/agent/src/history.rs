//! Bounded conversation history with summarizing eviction.

use crate::prompter::Prompter;
use blockmind_core::error::StoreError;
use blockmind_core::event::{AgentEvent, EventBus};
use blockmind_core::memory::{HistoryRecord, HistoryStore};
use blockmind_core::message::{Role, Turn};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The agent's recent turns plus a model-written summary of older ones.
///
/// Once the buffer reaches `max_messages` the oldest exchanges are evicted and
/// folded into `memory`. Eviction always leaves a user turn at the front
/// unless only one turn remains.
pub struct History {
    name: String,
    turns: Vec<Turn>,
    memory: String,
    max_messages: usize,
    prompter: Arc<Prompter>,
    store: Arc<dyn HistoryStore>,
    events: Arc<EventBus>,
}

impl History {
    pub fn new(
        name: impl Into<String>,
        prompter: Arc<Prompter>,
        store: Arc<dyn HistoryStore>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            name: name.into(),
            turns: Vec::new(),
            memory: String::new(),
            max_messages: 20,
            prompter,
            store,
            events,
        }
    }

    pub fn with_max_messages(mut self, max_messages: usize) -> Self {
        self.max_messages = max_messages.max(2);
        self
    }

    /// A copy of the current turns, safe to hand to the model.
    pub fn turns(&self) -> Vec<Turn> {
        self.turns.clone()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn memory(&self) -> &str {
        &self.memory
    }

    /// Append a turn from `source`.
    ///
    /// `"system"` becomes a system turn, the agent's own name an assistant
    /// turn, anyone else a user turn prefixed with their name.
    pub async fn add(&mut self, source: &str, content: &str) {
        let turn = if source == "system" {
            Turn::system(content)
        } else if source == self.name {
            Turn::assistant(content)
        } else {
            Turn::user(format!("{source}: {content}"))
        };
        self.turns.push(turn);

        if self.turns.len() >= self.max_messages {
            let mut evicted = Vec::new();
            while self.turns.len() >= self.max_messages && self.turns.len() > 1 {
                evicted.extend(self.evict());
            }
            self.store_memories(&evicted).await;
        }
    }

    fn evict(&mut self) -> Vec<Turn> {
        let mut evicted = vec![self.turns.remove(0)];
        while self.turns.len() > 1 && self.turns[0].role != Role::User {
            evicted.push(self.turns.remove(0));
        }
        evicted
    }

    async fn store_memories(&mut self, evicted: &[Turn]) {
        info!(evicted = evicted.len(), "Storing memories...");
        match self.prompter.prompt_mem_saving(&self.memory, evicted).await {
            Ok(memory) => {
                self.memory = memory;
                debug!(memory = %self.memory, "Memory updated");
            }
            Err(e) => warn!(error = %e, "Memory summarization failed, keeping previous memory"),
        }
        self.events.publish(AgentEvent::MemoryUpdated {
            evicted: evicted.len(),
            timestamp: Utc::now(),
        });
    }

    pub fn record(&self) -> HistoryRecord {
        HistoryRecord {
            name: self.name.clone(),
            memory: self.memory.clone(),
            turns: self.turns.clone(),
        }
    }

    pub async fn save(&self) -> Result<(), StoreError> {
        self.store.save(&self.record()).await?;
        debug!(agent = %self.name, store = self.store.name(), "History saved");
        Ok(())
    }

    /// Restore memory and turns. Returns `false` when nothing was stored.
    pub async fn load(&mut self) -> Result<bool, StoreError> {
        match self.store.load(&self.name).await? {
            Some(record) => {
                self.memory = record.memory;
                self.turns = record.turns;
                info!(agent = %self.name, turns = self.turns.len(), "History loaded");
                Ok(true)
            }
            None => {
                warn!(agent = %self.name, "No saved history for agent");
                Ok(false)
            }
        }
    }

    pub fn clear(&mut self) {
        self.turns.clear();
        self.memory.clear();
    }
}
