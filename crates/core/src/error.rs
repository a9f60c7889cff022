//! Error types for the BlockMind domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum.
//!
//! Only a failure to stop a running action is fatal to the process, and that
//! path goes through [`crate::Terminator`] rather than through an error value.
//! Everything here is recoverable and ends up as a chat or system message.

use std::path::PathBuf;
use thiserror::Error;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The prompt did not fit in the model's context window.
    #[error("Context length exceeded")]
    ContextLengthExceeded,

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Clone, Error)]
pub enum WorldError {
    #[error("Not connected to the world: {0}")]
    Disconnected(String),

    #[error("Skill {skill} failed: {reason}")]
    SkillFailed { skill: String, reason: String },

    #[error("Unknown target: {0}")]
    UnknownTarget(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Corrupted record at {path}: {reason}")]
    Corrupted { path: PathBuf, reason: String },
}

/// A generated action could not be turned into a runnable unit.
///
/// Fatal to the action being staged, never to the process.
#[derive(Debug, Error)]
pub enum StagingError {
    #[error("Parse error on statement {statement}: {reason}")]
    Parse { statement: usize, reason: String },

    #[error("Failed to write action artifact {path}: {reason}")]
    Write { path: PathBuf, reason: String },
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Command '{0}' does not exist.")]
    NotFound(String),

    #[error("Invalid arguments for {command}: {reason}")]
    InvalidArguments { command: String, reason: String },

    #[error("Command {command} failed: {reason}")]
    Failed { command: String, reason: String },
}
