//! Conversation transcript for chatting with uploaded documents.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Prefix of bot messages that report a failed exchange.
pub const ERROR_PREFIX: &str = "Error:";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Bot,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub text: String,
}

impl ChatMessage {
    /// Whether this is an inline error appended in place of a reply.
    pub fn is_error(&self) -> bool {
        self.role == ChatRole::Bot && self.text.starts_with(ERROR_PREFIX)
    }
}

/// Ordered list of chat messages. Failures never block further input;
/// they are appended as `Error: ...` bot messages.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    messages: Vec<ChatMessage>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    pub fn push_user(&mut self, text: impl Into<String>) {
        self.push(ChatRole::User, text.into());
    }

    pub fn push_bot(&mut self, text: impl Into<String>) {
        self.push(ChatRole::Bot, text.into());
    }

    pub fn push_error(&mut self, error: &CoreError) {
        self.push(ChatRole::Bot, format!("{ERROR_PREFIX} {error}"));
    }

    fn push(&mut self, role: ChatRole, text: String) {
        self.messages.push(ChatMessage { role, text });
    }
}

/// Trimmed query, or `None` for blank input.
pub fn normalize_query(input: &str) -> Option<&str> {
    let trimmed = input.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_queries_are_rejected() {
        assert_eq!(normalize_query("   \n"), None);
        assert_eq!(normalize_query("  what is clause 4? "), Some("what is clause 4?"));
    }

    #[test]
    fn errors_are_appended_inline() {
        let mut transcript = Transcript::new();
        transcript.push_user("hello");
        transcript.push_error(&CoreError::Authentication(
            "Not authenticated. Please login first.".into(),
        ));

        let last = transcript.last().unwrap();
        assert_eq!(last.role, ChatRole::Bot);
        assert_eq!(last.text, "Error: Not authenticated. Please login first.");
        assert!(last.is_error());
        assert!(!transcript.messages()[0].is_error());
    }

    #[test]
    fn bot_reply_is_not_an_error() {
        let mut transcript = Transcript::new();
        transcript.push_bot("Clause 4 covers termination.");
        assert!(!transcript.last().unwrap().is_error());
        assert_eq!(transcript.messages().len(), 1);
    }
}
