//! History persistence and similarity utilities for BlockMind.

pub mod file_backend;
pub mod in_memory;
pub mod vector;

pub use file_backend::FileHistoryStore;
pub use in_memory::InMemoryHistoryStore;
pub use vector::{cosine_similarity, rank_by_similarity};
