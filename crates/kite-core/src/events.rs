//! Session event types.
//!
//! Two layers:
//!
//! - **[`EventKind`]**: the closed set of things that can happen in a session
//!   (streamed deltas, the terminal assistant message, idle, error, and the
//!   tool lifecycle). Inbound backend frames carry exactly these payloads.
//! - **[`SessionEvent`]**: an `EventKind` stamped by the session runtime with
//!   its session ID and a per-session sequence number. This is what
//!   subscribers receive.
//!
//! Type strings follow the dotted wire names used by the backend
//! (`assistant.message_delta`, `tool.execution_complete`, ...).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{MessageId, SessionId, ToolCallId};

// ─────────────────────────────────────────────────────────────────────────────
// Tool call results
// ─────────────────────────────────────────────────────────────────────────────

/// Why a tool call did not produce output.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolFailureKind {
    /// The model asked for a tool that is not registered on the session.
    UnknownTool,
    /// The handler returned an error or panicked.
    Handler,
    /// The handler exceeded its time budget.
    Timeout,
    /// The session was destroyed before the handler finished.
    Abandoned,
}

impl ToolFailureKind {
    /// Stable string form, used in logs and tool-role log entries.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UnknownTool => "unknown_tool",
            Self::Handler => "handler",
            Self::Timeout => "timeout",
            Self::Abandoned => "abandoned",
        }
    }
}

/// Outcome of one tool call, carried by [`EventKind::ToolExecutionComplete`]
/// and forwarded to the backend as the model's continuation input.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolCallResult {
    /// The handler returned output.
    Success {
        /// Handler output, verbatim.
        output: String,
    },
    /// The call failed; the failure is data, never a panic in the runtime.
    Failure {
        /// Failure category.
        kind: ToolFailureKind,
        /// Human-readable description.
        message: String,
    },
}

impl ToolCallResult {
    /// Successful result.
    #[must_use]
    pub fn success(output: impl Into<String>) -> Self {
        Self::Success {
            output: output.into(),
        }
    }

    /// Failed result.
    #[must_use]
    pub fn failure(kind: ToolFailureKind, message: impl Into<String>) -> Self {
        Self::Failure {
            kind,
            message: message.into(),
        }
    }

    /// Whether the call produced output.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Handler output, if the call succeeded.
    #[must_use]
    pub fn output(&self) -> Option<&str> {
        match self {
            Self::Success { output } => Some(output),
            Self::Failure { .. } => None,
        }
    }

    /// Failure kind, if the call failed.
    #[must_use]
    pub fn failure_kind(&self) -> Option<ToolFailureKind> {
        match self {
            Self::Success { .. } => None,
            Self::Failure { kind, .. } => Some(*kind),
        }
    }

    /// Text suitable for the message log: the output, or `"<kind>: <message>"`.
    #[must_use]
    pub fn log_text(&self) -> String {
        match self {
            Self::Success { output } => output.clone(),
            Self::Failure { kind, message } => format!("{}: {message}", kind.as_str()),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// EventKind: the closed event variant
// ─────────────────────────────────────────────────────────────────────────────

/// Payload of a session event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all_fields = "camelCase")]
pub enum EventKind {
    /// Complete assistant message; terminal for the deltas sharing its ID.
    #[serde(rename = "assistant.message")]
    AssistantMessage {
        /// Message ID shared with the preceding deltas.
        message_id: MessageId,
        /// Full message content.
        content: String,
    },

    /// Incremental fragment of an in-progress assistant message.
    #[serde(rename = "assistant.message_delta")]
    AssistantMessageDelta {
        /// Message the fragment belongs to.
        message_id: MessageId,
        /// Text fragment.
        delta_content: String,
    },

    /// The session has no pending generation or tool work.
    #[serde(rename = "session.idle")]
    SessionIdle,

    /// The current turn failed.
    #[serde(rename = "session.error")]
    SessionError {
        /// Error category (`model`, `connection`, ...).
        error_type: String,
        /// Human-readable message.
        message: String,
    },

    /// The model requested a tool call.
    #[serde(rename = "tool.execution_start")]
    ToolExecutionStart {
        /// Call ID, unique within the session.
        tool_call_id: ToolCallId,
        /// Name of the requested tool.
        tool_name: String,
        /// JSON input for the handler.
        #[serde(default)]
        arguments: Value,
    },

    /// A tool call finished (successfully or not).
    #[serde(rename = "tool.execution_complete")]
    ToolExecutionComplete {
        /// Call ID from the matching start event.
        tool_call_id: ToolCallId,
        /// Name of the tool.
        tool_name: String,
        /// Output or failure.
        result: ToolCallResult,
    },
}

impl EventKind {
    /// Wire type string.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::AssistantMessage { .. } => "assistant.message",
            Self::AssistantMessageDelta { .. } => "assistant.message_delta",
            Self::SessionIdle => "session.idle",
            Self::SessionError { .. } => "session.error",
            Self::ToolExecutionStart { .. } => "tool.execution_start",
            Self::ToolExecutionComplete { .. } => "tool.execution_complete",
        }
    }

    /// Whether this event ends a turn (idle or error).
    #[must_use]
    pub fn is_turn_end(&self) -> bool {
        matches!(self, Self::SessionIdle | Self::SessionError { .. })
    }

    /// Whether this is a tool lifecycle event.
    #[must_use]
    pub fn is_tool_execution(&self) -> bool {
        matches!(
            self,
            Self::ToolExecutionStart { .. } | Self::ToolExecutionComplete { .. }
        )
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SessionEvent: sequenced envelope delivered to subscribers
// ─────────────────────────────────────────────────────────────────────────────

/// An immutable, sequence-numbered session notification.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEvent {
    /// Session the event belongs to.
    pub session_id: SessionId,
    /// Per-session sequence number, starting at 1 and strictly increasing.
    pub seq: u64,
    /// ISO 8601 timestamp assigned when the event was sequenced.
    pub timestamp: String,
    /// Event payload.
    pub kind: EventKind,
}

impl SessionEvent {
    /// Stamp a payload with session context and the current UTC time.
    #[must_use]
    pub fn new(session_id: SessionId, seq: u64, kind: EventKind) -> Self {
        Self {
            session_id,
            seq,
            timestamp: chrono::Utc::now().to_rfc3339(),
            kind,
        }
    }

    /// Wire type string of the payload.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        self.kind.event_type()
    }

    /// Delta text, if this is an `assistant.message_delta` event.
    #[must_use]
    pub fn delta_content(&self) -> Option<&str> {
        match &self.kind {
            EventKind::AssistantMessageDelta { delta_content, .. } => Some(delta_content),
            _ => None,
        }
    }

    /// Full content, if this is an `assistant.message` event.
    #[must_use]
    pub fn message_content(&self) -> Option<&str> {
        match &self.kind {
            EventKind::AssistantMessage { content, .. } => Some(content),
            _ => None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Factory helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Create an `assistant.message_delta` payload.
#[must_use]
pub fn delta_event(message_id: impl Into<MessageId>, delta: impl Into<String>) -> EventKind {
    EventKind::AssistantMessageDelta {
        message_id: message_id.into(),
        delta_content: delta.into(),
    }
}

/// Create an `assistant.message` payload.
#[must_use]
pub fn message_event(message_id: impl Into<MessageId>, content: impl Into<String>) -> EventKind {
    EventKind::AssistantMessage {
        message_id: message_id.into(),
        content: content.into(),
    }
}

/// Create a `session.error` payload.
#[must_use]
pub fn error_event(error_type: impl Into<String>, message: impl Into<String>) -> EventKind {
    EventKind::SessionError {
        error_type: error_type.into(),
        message: message.into(),
    }
}

/// Create a `tool.execution_start` payload.
#[must_use]
pub fn tool_start_event(
    tool_call_id: impl Into<ToolCallId>,
    tool_name: impl Into<String>,
    arguments: Value,
) -> EventKind {
    EventKind::ToolExecutionStart {
        tool_call_id: tool_call_id.into(),
        tool_name: tool_name.into(),
        arguments,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn delta_wire_format() {
        let e = delta_event("m1", "Hel");
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(
            json,
            json!({"type": "assistant.message_delta", "data": {"messageId": "m1", "deltaContent": "Hel"}})
        );
    }

    #[test]
    fn idle_wire_format() {
        let json = serde_json::to_value(EventKind::SessionIdle).unwrap();
        assert_eq!(json["type"], "session.idle");
        let back: EventKind = serde_json::from_value(json!({"type": "session.idle"})).unwrap();
        assert_eq!(back, EventKind::SessionIdle);
    }

    #[test]
    fn tool_start_parses_from_backend_json() {
        let e: EventKind = serde_json::from_value(json!({
            "type": "tool.execution_start",
            "data": {"toolCallId": "c1", "toolName": "list_local_files", "arguments": {"directory": "."}}
        }))
        .unwrap();
        match e {
            EventKind::ToolExecutionStart {
                tool_call_id,
                tool_name,
                arguments,
            } => {
                assert_eq!(tool_call_id.as_str(), "c1");
                assert_eq!(tool_name, "list_local_files");
                assert_eq!(arguments["directory"], ".");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn tool_complete_failure_wire_format() {
        let e = EventKind::ToolExecutionComplete {
            tool_call_id: "c1".into(),
            tool_name: "mv".into(),
            result: ToolCallResult::failure(ToolFailureKind::UnknownTool, "no such tool: mv"),
        };
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["data"]["result"]["status"], "failure");
        assert_eq!(json["data"]["result"]["kind"], "unknown_tool");
    }

    #[test]
    fn event_type_strings() {
        assert_eq!(message_event("m", "x").event_type(), "assistant.message");
        assert_eq!(error_event("model", "boom").event_type(), "session.error");
        assert_eq!(
            tool_start_event("c", "t", Value::Null).event_type(),
            "tool.execution_start"
        );
    }

    #[test]
    fn turn_end_classification() {
        assert!(EventKind::SessionIdle.is_turn_end());
        assert!(error_event("model", "x").is_turn_end());
        assert!(!delta_event("m", "x").is_turn_end());
        assert!(tool_start_event("c", "t", Value::Null).is_tool_execution());
    }

    #[test]
    fn tool_result_accessors() {
        let ok = ToolCallResult::success("a\nb");
        assert!(ok.is_success());
        assert_eq!(ok.output(), Some("a\nb"));
        assert_eq!(ok.log_text(), "a\nb");

        let failed = ToolCallResult::failure(ToolFailureKind::Timeout, "after 10ms");
        assert_eq!(failed.failure_kind(), Some(ToolFailureKind::Timeout));
        assert_eq!(failed.log_text(), "timeout: after 10ms");
    }

    #[test]
    fn session_event_accessors() {
        let e = SessionEvent::new(SessionId::from("s1"), 3, delta_event("m", "lo"));
        assert_eq!(e.seq, 3);
        assert_eq!(e.delta_content(), Some("lo"));
        assert_eq!(e.message_content(), None);
        assert!(!e.timestamp.is_empty());
    }
}
