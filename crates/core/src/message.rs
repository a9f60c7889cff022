//! Conversation turn domain types.
//!
//! A [`Turn`] is the unit the history buffer stores and replays to the model.
//! Ordering is append-only and significant.

use serde::{Deserialize, Serialize};

/// The role of a turn's author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Runtime notices: command results, errors, recovery hints
    System,
    /// Anyone talking to the agent; marks an exchange boundary
    User,
    /// The agent itself
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// A single conversation turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Create a user turn.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create an assistant turn.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Create a system turn.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Whether this turn starts a new exchange.
    pub fn is_exchange_boundary(&self) -> bool {
        self.role == Role::User
    }

    /// The content with a leading `"sender: "` prefix removed.
    pub fn content_without_sender(&self) -> &str {
        match self.content.find(':') {
            Some(idx) => self.content[idx + 1..].trim(),
            None => self.content.trim(),
        }
    }
}

/// Render turns as plain text for prompts that embed a transcript
/// (memory summarization, few-shot examples).
pub fn stringify_turns(turns: &[Turn]) -> String {
    let mut out = String::new();
    for turn in turns {
        match turn.role {
            Role::Assistant => {
                out.push_str("\nYour output:\n");
                out.push_str(&turn.content);
            }
            Role::System => {
                out.push_str("\nSystem output: ");
                out.push_str(&turn.content);
            }
            Role::User => {
                out.push_str("\nUser input: ");
                out.push_str(&turn.content);
            }
        }
    }
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_user_turns_are_boundaries() {
        assert!(Turn::user("steve: hi").is_exchange_boundary());
        assert!(!Turn::assistant("hello").is_exchange_boundary());
        assert!(!Turn::system("Agent stopped.").is_exchange_boundary());
    }

    #[test]
    fn strips_sender_prefix() {
        let turn = Turn::user("steve: come here please");
        assert_eq!(turn.content_without_sender(), "come here please");
        assert_eq!(Turn::user("no prefix").content_without_sender(), "no prefix");
    }

    #[test]
    fn role_serializes_lowercase() {
        let json = serde_json::to_string(&Turn::assistant("ok")).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"ok"}"#);
    }

    #[test]
    fn stringify_labels_each_role() {
        let text = stringify_turns(&[
            Turn::user("steve: get wood"),
            Turn::assistant("On it! !collectBlocks(\"oak_log\", 3)"),
            Turn::system("Code output:\nCollected 3 oak_log."),
        ]);
        assert!(text.starts_with("User input: steve: get wood"));
        assert!(text.contains("Your output:\nOn it!"));
        assert!(text.ends_with("System output: Code output:\nCollected 3 oak_log."));
    }
}
