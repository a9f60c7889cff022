//! History persistence port.
//!
//! One record per agent, overwritten wholesale on every save.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::StoreError;
use crate::message::Turn;

/// The persisted form of an agent's conversation history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub name: String,

    /// Standing summary of evicted turns
    #[serde(default)]
    pub memory: String,

    #[serde(default)]
    pub turns: Vec<Turn>,
}

/// Where conversation history lives between sessions.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// A human-readable name for this backend (e.g., "file").
    fn name(&self) -> &str;

    /// Load the record for `agent_name`, or `None` if nothing was saved yet.
    async fn load(&self, agent_name: &str) -> std::result::Result<Option<HistoryRecord>, StoreError>;

    /// Replace the stored record for `record.name`.
    async fn save(&self, record: &HistoryRecord) -> std::result::Result<(), StoreError>;
}
