//! Message-log types.
//!
//! A session keeps an append-only log of what was exchanged: the user's
//! prompts, the assistant's terminal messages, and tool results.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ids::ToolCallId;

/// Author of a log entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Prompt sent by the caller.
    User,
    /// Terminal assistant message.
    Assistant,
    /// Result of a tool call.
    Tool,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
            Self::Tool => write!(f, "tool"),
        }
    }
}

/// One `(role, content)` entry of the session's message log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEntry {
    /// Author.
    pub role: MessageRole,
    /// Text content.
    pub content: String,
    /// Tool call this entry answers (tool entries only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<ToolCallId>,
    /// ISO 8601 time the entry was appended.
    pub timestamp: String,
}

impl MessageEntry {
    fn now(role: MessageRole, content: String, tool_call_id: Option<ToolCallId>) -> Self {
        Self {
            role,
            content,
            tool_call_id,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// A user prompt.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::now(MessageRole::User, content.into(), None)
    }

    /// A terminal assistant message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::now(MessageRole::Assistant, content.into(), None)
    }

    /// A tool result.
    #[must_use]
    pub fn tool(tool_call_id: ToolCallId, content: impl Into<String>) -> Self {
        Self::now(MessageRole::Tool, content.into(), Some(tool_call_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&MessageRole::User).unwrap(), "\"user\"");
        assert_eq!(MessageRole::Tool.to_string(), "tool");
    }

    #[test]
    fn tool_entry_carries_call_id() {
        let e = MessageEntry::tool(ToolCallId::from("c1"), "done");
        assert_eq!(e.role, MessageRole::Tool);
        assert_eq!(e.tool_call_id.as_ref().map(ToolCallId::as_str), Some("c1"));
    }

    #[test]
    fn user_entry_omits_call_id_on_wire() {
        let json = serde_json::to_value(MessageEntry::user("hi")).unwrap();
        assert!(json.get("toolCallId").is_none());
        assert_eq!(json["role"], "user");
    }
}
