//! # BlockMind Core
//!
//! Domain types, ports, and error definitions for the BlockMind agent runtime.
//! This crate has **no framework code**: it defines the domain model that
//! every other crate implements against.
//!
//! ## Ports
//!
//! The runtime talks to the outside through three traits defined here:
//! - [`Provider`]: the language model (prompt → text, embeddings)
//! - [`World`]: the live environment the agent acts in
//! - [`HistoryStore`]: where conversation history is persisted
//!
//! Implementations live in their respective crates, so the executor, the
//! behavior scheduler, and the conversation loop can all be tested against
//! scripted stand-ins.

pub mod error;
pub mod event;
pub mod lifecycle;
pub mod memory;
pub mod message;
pub mod provider;
pub mod world;

// Re-export key types at crate root for ergonomics
pub use error::{CommandError, ProviderError, StagingError, StoreError, WorldError};
pub use event::{AgentEvent, EventBus};
pub use lifecycle::{ProcessTerminator, Terminator};
pub use memory::{HistoryRecord, HistoryStore};
pub use message::{Role, Turn};
pub use provider::{Provider, ProviderRequest, ProviderResponse};
pub use world::{Entity, EntityKind, ItemStack, Position, Skill, SkillOutcome, World};
