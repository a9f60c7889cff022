//! File-based history store: one pretty-printed JSON record per agent.
//!
//! Storage location: `<root>/<agent name>/memory.json`, overwritten
//! wholesale on every save. Human-inspectable and easy to hand-edit.

use async_trait::async_trait;
use blockmind_core::error::StoreError;
use blockmind_core::memory::{HistoryRecord, HistoryStore};
use std::path::PathBuf;
use tracing::{debug, info};

pub struct FileHistoryStore {
    root: PathBuf,
}

impl FileHistoryStore {
    /// Create a store rooted at the data directory (usually `bots/`).
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Where the record for `agent_name` lives.
    pub fn path_for(&self, agent_name: &str) -> PathBuf {
        self.root.join(agent_name).join("memory.json")
    }
}

#[async_trait]
impl HistoryStore for FileHistoryStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn load(&self, agent_name: &str) -> Result<Option<HistoryRecord>, StoreError> {
        let path = self.path_for(agent_name);
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), agent = agent_name, "No memory file for agent");
                return Ok(None);
            }
            Err(e) => {
                return Err(StoreError::Storage(format!(
                    "Failed to read {}: {e}",
                    path.display()
                )));
            }
        };

        let record: HistoryRecord =
            serde_json::from_str(&content).map_err(|e| StoreError::Corrupted {
                path: path.clone(),
                reason: e.to_string(),
            })?;

        debug!(path = %path.display(), turns = record.turns.len(), "History loaded");
        Ok(Some(record))
    }

    async fn save(&self, record: &HistoryRecord) -> Result<(), StoreError> {
        let path = self.path_for(&record.name);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Storage(format!("Failed to create agent directory: {e}"))
            })?;
        }

        let json = serde_json::to_string_pretty(record)
            .map_err(|e| StoreError::Storage(format!("Failed to serialize history: {e}")))?;

        std::fs::write(&path, json)
            .map_err(|e| StoreError::Storage(format!("Failed to write history file: {e}")))?;

        debug!(path = %path.display(), turns = record.turns.len(), "History saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blockmind_core::Turn;
    use tempfile::TempDir;

    fn record(name: &str) -> HistoryRecord {
        HistoryRecord {
            name: name.into(),
            memory: "Steve likes oak logs.".into(),
            turns: vec![
                Turn::user("steve: hi"),
                Turn::assistant("Hey steve!"),
            ],
        }
    }

    #[tokio::test]
    async fn save_then_load_restores_record() {
        let dir = TempDir::new().unwrap();
        let store = FileHistoryStore::new(dir.path());

        store.save(&record("andy")).await.unwrap();
        assert!(dir.path().join("andy").join("memory.json").exists());

        let loaded = store.load("andy").await.unwrap().unwrap();
        assert_eq!(loaded, record("andy"));
    }

    #[tokio::test]
    async fn missing_record_is_none() {
        let dir = TempDir::new().unwrap();
        let store = FileHistoryStore::new(dir.path());
        assert!(store.load("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_overwrites_wholesale() {
        let dir = TempDir::new().unwrap();
        let store = FileHistoryStore::new(dir.path());

        store.save(&record("andy")).await.unwrap();
        let empty = HistoryRecord { name: "andy".into(), ..Default::default() };
        store.save(&empty).await.unwrap();

        let loaded = store.load("andy").await.unwrap().unwrap();
        assert!(loaded.turns.is_empty());
        assert!(loaded.memory.is_empty());
    }

    #[tokio::test]
    async fn garbage_file_is_corrupted() {
        let dir = TempDir::new().unwrap();
        let store = FileHistoryStore::new(dir.path());
        std::fs::create_dir_all(dir.path().join("andy")).unwrap();
        std::fs::write(store.path_for("andy"), "{not json").unwrap();

        let err = store.load("andy").await.unwrap_err();
        assert!(matches!(err, StoreError::Corrupted { .. }));
    }
}
