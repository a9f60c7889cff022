//! Agent event system: decoupled signalling between the executor, the
//! behavior scheduler, and the conversation loop.
//!
//! The executor publishes [`AgentEvent::Idle`] when an action finishes
//! cleanly; the runtime listens for it to unpause behaviors and resume the
//! remembered task. Everything else is informational.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All agent events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AgentEvent {
    /// Nothing is executing and no code generation is pending
    Idle {
        timestamp: DateTime<Utc>,
    },

    /// An inbound chat message was accepted
    MessageReceived {
        source: String,
        preview: String,
        timestamp: DateTime<Utc>,
    },

    /// A `!command` finished
    CommandExecuted {
        name: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// An `execute` call returned
    ActionFinished {
        success: bool,
        interrupted: bool,
        timed_out: bool,
        timestamp: DateTime<Utc>,
    },

    /// A behavior launched an action
    ModeTriggered {
        mode: String,
        timestamp: DateTime<Utc>,
    },

    /// History evicted turns into the memory summary
    MemoryUpdated {
        evicted: usize,
        timestamp: DateTime<Utc>,
    },
}

impl AgentEvent {
    pub fn idle() -> Self {
        AgentEvent::Idle { timestamp: Utc::now() }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, AgentEvent::Idle { .. })
    }
}

/// A broadcast-based event bus for agent events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<AgentEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: AgentEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<AgentEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
