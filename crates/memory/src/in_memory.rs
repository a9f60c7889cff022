//! In-memory history store: useful for testing and ephemeral sessions.

use async_trait::async_trait;
use blockmind_core::error::StoreError;
use blockmind_core::memory::{HistoryRecord, HistoryStore};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Keeps records in a map keyed by agent name.
pub struct InMemoryHistoryStore {
    records: Arc<RwLock<HashMap<String, HistoryRecord>>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Number of agents with a saved record.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

impl Default for InMemoryHistoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    fn name(&self) -> &str { "in_memory" }

    async fn load(&self, agent_name: &str) -> Result<Option<HistoryRecord>, StoreError> {
        Ok(self.records.read().await.get(agent_name).cloned())
    }

    async fn save(&self, record: &HistoryRecord) -> Result<(), StoreError> {
        self.records
            .write()
            .await
            .insert(record.name.clone(), record.clone());
        Ok(())
    }
}
