//! The BlockMind agent: everything between an inbound chat line and the
//! actions the bot takes in the world.
//!
//! Three pieces cooperate:
//!
//! 1. **Executor** runs one action at a time under a cooperative
//!    cancellation token, a watchdog timeout, and a remembered resumable task
//! 2. **ModeController** ticks the reactive behaviors in priority order and
//!    decides which of them may preempt what is running
//! 3. **Agent** records the conversation in a self-summarizing [`History`],
//!    asks the model for replies, and dispatches the `!commands` it finds
//!
//! [`AgentRuntime`] wires them to a [`blockmind_core::World`] and keeps the
//! tick loop and the idle listener running.

pub mod action;
pub mod agent;
pub mod commands;
pub mod examples;
pub mod executor;
pub mod history;
pub mod modes;
pub mod prompter;
pub mod runtime;
pub mod syntax;

#[cfg(test)]
mod test_helpers;

pub use action::{ActionStager, StagedAction};
pub use agent::Agent;
pub use commands::{Command, CommandContext, CommandRegistry};
pub use executor::{ActionContext, ActionFn, ExecutionResult, Executor, ExecutorState, ResumableTask};
pub use history::History;
pub use modes::{ModeController, catalog};
pub use prompter::Prompter;
pub use runtime::AgentRuntime;
