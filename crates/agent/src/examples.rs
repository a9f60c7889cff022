//! Few-shot example selection.
//!
//! Each example conversation is embedded once from its user turns; at prompt
//! time the current conversation is embedded and the closest examples are
//! rendered into the system prompt.

use blockmind_core::message::{Role, Turn, stringify_turns};
use blockmind_core::provider::{EmbeddingRequest, Provider};
use blockmind_memory::rank_by_similarity;
use std::sync::Arc;
use tracing::{debug, warn};

/// How many examples go into each prompt.
pub const DEFAULT_SELECT_NUM: usize = 2;

#[derive(Debug, Clone)]
struct Example {
    turns: Vec<Turn>,
    embedding: Option<Vec<f32>>,
}

pub struct Examples {
    examples: Vec<Example>,
    provider: Arc<dyn Provider>,
    embedding_model: String,
    select_num: usize,
}

impl Examples {
    pub fn new(provider: Arc<dyn Provider>, embedding_model: impl Into<String>) -> Self {
        Self {
            examples: Vec::new(),
            provider,
            embedding_model: embedding_model.into(),
            select_num: DEFAULT_SELECT_NUM,
        }
    }

    pub fn with_select_num(mut self, select_num: usize) -> Self {
        self.select_num = select_num;
        self
    }

    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    /// Replace the example set and embed every example in one batch.
    ///
    /// If embedding fails the examples are kept without vectors and
    /// selection falls back to the first few.
    pub async fn load(&mut self, examples: Vec<Vec<Turn>>) {
        let texts: Vec<String> = examples.iter().map(|turns| user_text(turns)).collect();
        let embeddings = if texts.is_empty() {
            Vec::new()
        } else {
            match self.embed(texts).await {
                Some(vectors) if vectors.len() == examples.len() => vectors.into_iter().map(Some).collect(),
                Some(vectors) => {
                    warn!(
                        expected = examples.len(),
                        got = vectors.len(),
                        "Embedding count mismatch, examples will not be ranked"
                    );
                    vec![None; examples.len()]
                }
                None => vec![None; examples.len()],
            }
        };

        self.examples = examples
            .into_iter()
            .zip(embeddings)
            .map(|(turns, embedding)| Example { turns, embedding })
            .collect();
        debug!(count = self.examples.len(), "Examples loaded");
    }

    /// The examples most similar to `turns`, best first.
    pub async fn relevant(&self, turns: &[Turn]) -> Vec<Vec<Turn>> {
        let fallback = || {
            self.examples
                .iter()
                .take(self.select_num)
                .map(|e| e.turns.clone())
                .collect()
        };

        let Some(candidates) = self
            .examples
            .iter()
            .map(|e| e.embedding.clone())
            .collect::<Option<Vec<_>>>()
        else {
            return fallback();
        };
        if candidates.is_empty() {
            return Vec::new();
        }

        let query = conversation_text(turns);
        let Some(query_embedding) = self.embed(vec![query]).await.and_then(|mut v| v.pop()) else {
            return fallback();
        };

        rank_by_similarity(&candidates, &query_embedding, self.select_num)
            .into_iter()
            .map(|i| self.examples[i].turns.clone())
            .collect()
    }

    /// Render the selected examples for `$EXAMPLES`. Empty when there are none.
    pub async fn create_example_message(&self, turns: &[Turn]) -> String {
        let selected = self.relevant(turns).await;
        if selected.is_empty() {
            return String::new();
        }
        let mut msg = String::from("Examples of how to respond:\n");
        for (i, example) in selected.iter().enumerate() {
            msg.push_str(&format!("Example {}:\n{}\n\n", i + 1, stringify_turns(example)));
        }
        msg
    }

    async fn embed(&self, inputs: Vec<String>) -> Option<Vec<Vec<f32>>> {
        let request = EmbeddingRequest {
            model: self.embedding_model.clone(),
            inputs,
        };
        match self.provider.embed(request).await {
            Ok(response) => Some(response.embeddings),
            Err(e) => {
                warn!(error = %e, "Embedding failed, using unranked examples");
                None
            }
        }
    }
}

/// User turns of an example, sender prefixes stripped.
fn user_text(turns: &[Turn]) -> String {
    joined(turns.iter().filter(|t| t.role == Role::User))
}

/// Everything the agent did not say itself.
fn conversation_text(turns: &[Turn]) -> String {
    joined(turns.iter().filter(|t| t.role != Role::Assistant))
}

fn joined<'a>(turns: impl Iterator<Item = &'a Turn>) -> String {
    turns
        .map(|t| t.content_without_sender())
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}
