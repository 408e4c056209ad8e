//! Built-in echo backend.
//!
//! Used when no backend command is configured, so every subcommand can be
//! exercised offline. The backend answers a prompt with `You said: <prompt>`
//! streamed word by word. When the session has announced a tool named
//! [`LIST_FILES_TOOL`], it requests that tool first and answers with the
//! tool's output once the result comes back.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use kite_core::events::{EventKind, delta_event, message_event, tool_start_event};
use kite_core::ids::{MessageId, SessionId};
use kite_runtime::{InboundFrame, LoopbackConnection, OutboundRequest};
use parking_lot::Mutex;
use serde_json::json;
use tracing::debug;

use crate::tools::LIST_FILES_TOOL;

#[derive(Default)]
struct EchoSession {
    streaming: bool,
    tools: Vec<String>,
}

/// Scripted backend state, shared by the connection's responder.
#[derive(Default)]
pub struct EchoBackend {
    sessions: Mutex<HashMap<SessionId, EchoSession>>,
    next_call: AtomicU64,
}

impl EchoBackend {
    /// Loopback connection answered by a fresh echo backend.
    pub fn connection() -> LoopbackConnection {
        let backend = Arc::new(Self::default());
        LoopbackConnection::new(move |request| backend.respond(request))
    }

    /// Frames the backend emits in answer to `request`.
    pub fn respond(&self, request: &OutboundRequest) -> Vec<InboundFrame> {
        match request {
            OutboundRequest::CreateSession {
                session_id,
                streaming,
                tools,
                ..
            } => {
                let session = EchoSession {
                    streaming: *streaming,
                    tools: tools.iter().map(|t| t.name.clone()).collect(),
                };
                let _ = self.sessions.lock().insert(session_id.clone(), session);
                Vec::new()
            }
            OutboundRequest::Send {
                session_id,
                prompt,
                tools,
                ..
            } => {
                let mut sessions = self.sessions.lock();
                let session = sessions.entry(session_id.clone()).or_default();
                if let Some(tools) = tools {
                    session.tools = tools.iter().map(|t| t.name.clone()).collect();
                }
                if session.tools.iter().any(|name| name == LIST_FILES_TOOL) {
                    let call_id = format!("call-{}", self.next_call.fetch_add(1, Ordering::Relaxed) + 1);
                    debug!(session_id = %session_id, call_id, "echo backend requesting tool");
                    return vec![InboundFrame::new(
                        session_id.clone(),
                        tool_start_event(call_id, LIST_FILES_TOOL, json!({})),
                    )];
                }
                reply(session_id, session.streaming, &format!("You said: {prompt}"))
            }
            OutboundRequest::ToolResult {
                session_id, result, ..
            } => {
                let streaming = self
                    .sessions
                    .lock()
                    .get(session_id)
                    .is_some_and(|s| s.streaming);
                let text = format!("Here is what I found:\n{}", result.log_text());
                reply(session_id, streaming, &text)
            }
            OutboundRequest::Destroy { session_id } => {
                let _ = self.sessions.lock().remove(session_id);
                Vec::new()
            }
        }
    }
}

/// Optional word deltas, the full message, then idle.
fn reply(session_id: &SessionId, streaming: bool, text: &str) -> Vec<InboundFrame> {
    let message_id = MessageId::new();
    let mut frames = Vec::new();
    if streaming {
        frames.extend(text.split_inclusive(' ').map(|part| {
            InboundFrame::new(session_id.clone(), delta_event(message_id.clone(), part))
        }));
    }
    frames.push(InboundFrame::new(
        session_id.clone(),
        message_event(message_id, text),
    ));
    frames.push(InboundFrame::new(session_id.clone(), EventKind::SessionIdle));
    frames
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use kite_core::events::ToolCallResult;
    use kite_core::tools::{ToolDefinition, ToolParameterSchema};

    fn create(backend: &EchoBackend, sid: &SessionId, streaming: bool, tools: &[&str]) {
        let tools = tools
            .iter()
            .map(|name| ToolDefinition {
                name: (*name).to_owned(),
                description: String::new(),
                parameters: ToolParameterSchema::object(),
            })
            .collect();
        let frames = backend.respond(&OutboundRequest::CreateSession {
            session_id: sid.clone(),
            model: "gpt-4.1".into(),
            streaming,
            tools,
        });
        assert!(frames.is_empty());
    }

    fn send(sid: &SessionId, prompt: &str) -> OutboundRequest {
        OutboundRequest::Send {
            session_id: sid.clone(),
            prompt: prompt.into(),
            model: None,
            tools: None,
        }
    }

    fn content(frames: &[InboundFrame]) -> String {
        frames
            .iter()
            .filter_map(|f| match &f.event {
                EventKind::AssistantMessageDelta { delta_content, .. } => Some(delta_content.as_str()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn echoes_prompt_as_streamed_reply() {
        let backend = EchoBackend::default();
        let sid = SessionId::from("s1");
        create(&backend, &sid, true, &[]);

        let frames = backend.respond(&send(&sid, "What is 2+2?"));
        assert_eq!(content(&frames), "You said: What is 2+2?");
        // "You ", "said: ", "What ", "is ", "2+2?"
        assert_eq!(frames.len(), 7);
        assert!(
            frames[..5]
                .iter()
                .all(|f| f.event.event_type() == "assistant.message_delta")
        );
        assert_matches!(
            &frames[5].event,
            EventKind::AssistantMessage { content, .. } if content == "You said: What is 2+2?"
        );
        assert_eq!(frames[6].event, EventKind::SessionIdle);
    }

    #[test]
    fn non_streaming_session_gets_message_only() {
        let backend = EchoBackend::default();
        let sid = SessionId::from("s1");
        create(&backend, &sid, false, &[]);

        let frames = backend.respond(&send(&sid, "hi"));
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].event.event_type(), "assistant.message");
    }

    #[test]
    fn requests_file_tool_then_quotes_result() {
        let backend = EchoBackend::default();
        let sid = SessionId::from("s1");
        create(&backend, &sid, true, &[LIST_FILES_TOOL]);

        let frames = backend.respond(&send(&sid, "which files are here?"));
        assert_eq!(frames.len(), 1);
        let call_id = match &frames[0].event {
            EventKind::ToolExecutionStart {
                tool_call_id,
                tool_name,
                ..
            } => {
                assert_eq!(tool_name, LIST_FILES_TOOL);
                tool_call_id.clone()
            }
            other => panic!("unexpected frame: {other:?}"),
        };

        let frames = backend.respond(&OutboundRequest::ToolResult {
            session_id: sid.clone(),
            tool_call_id: call_id,
            result: ToolCallResult::success("Files in .:\na.txt"),
        });
        assert_eq!(content(&frames), "Here is what I found:\nFiles in .:\na.txt");
        assert_eq!(frames.last().map(|f| &f.event), Some(&EventKind::SessionIdle));
    }

    #[test]
    fn tools_announced_on_send_replace_created_set() {
        let backend = EchoBackend::default();
        let sid = SessionId::from("s1");
        create(&backend, &sid, true, &[]);

        let frames = backend.respond(&OutboundRequest::Send {
            session_id: sid.clone(),
            prompt: "list".into(),
            model: None,
            tools: Some(vec![ToolDefinition {
                name: LIST_FILES_TOOL.into(),
                description: String::new(),
                parameters: ToolParameterSchema::object(),
            }]),
        });
        assert_eq!(frames[0].event.event_type(), "tool.execution_start");
    }

    #[test]
    fn call_ids_are_unique() {
        let backend = EchoBackend::default();
        let sid = SessionId::from("s1");
        create(&backend, &sid, true, &[LIST_FILES_TOOL]);

        let a = backend.respond(&send(&sid, "one"));
        let b = backend.respond(&send(&sid, "two"));
        assert_ne!(a[0].event, b[0].event);
    }

    #[test]
    fn destroy_forgets_session() {
        let backend = EchoBackend::default();
        let sid = SessionId::from("s1");
        create(&backend, &sid, false, &[LIST_FILES_TOOL]);
        let _ = backend.respond(&OutboundRequest::Destroy {
            session_id: sid.clone(),
        });
        assert!(backend.sessions.lock().is_empty());
    }
}
