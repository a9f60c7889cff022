//! LLM Provider implementations for BlockMind.
//!
//! All providers implement the `blockmind_core::Provider` trait.
//! The router selects the correct provider based on configuration.

pub mod openai_compat;
pub mod router;

pub use openai_compat::{DEFAULT_EMBEDDING_MODEL, OpenAiCompatProvider};
pub use router::{ProviderRouter, build_from_config};
