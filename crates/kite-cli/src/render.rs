//! Terminal rendering of session events.

use std::io::Write;

use kite_core::events::{EventKind, SessionEvent, ToolCallResult};

/// Turns session events into terminal text.
#[derive(Clone, Copy, Debug)]
pub struct Renderer {
    streaming: bool,
}

impl Renderer {
    /// Renderer for a session with the given streaming flag.
    pub fn stdout(streaming: bool) -> Self {
        Self { streaming }
    }

    /// Print `event` to stdout.
    pub fn render(self, event: &SessionEvent) {
        if let Some(text) = self.format(event) {
            let mut out = std::io::stdout().lock();
            let _ = out.write_all(text.as_bytes());
            let _ = out.flush();
        }
    }

    /// Text printed for `event`, if any.
    ///
    /// Streaming sessions print deltas as they arrive and skip the final
    /// message; non-streaming sessions print only the final message.
    pub fn format(self, event: &SessionEvent) -> Option<String> {
        match &event.kind {
            EventKind::AssistantMessageDelta { delta_content, .. } if self.streaming => {
                Some(delta_content.clone())
            }
            EventKind::AssistantMessage { content, .. } if !self.streaming => {
                Some(format!("{content}\n"))
            }
            EventKind::AssistantMessageDelta { .. } | EventKind::AssistantMessage { .. } => None,
            EventKind::SessionIdle => Some("\n--- Session is idle ---\n".to_owned()),
            EventKind::SessionError { message, .. } => {
                Some(format!("\n--- Session error: {message} ---\n"))
            }
            EventKind::ToolExecutionStart { tool_name, .. } => {
                Some(format!("  → Running: {tool_name}\n"))
            }
            EventKind::ToolExecutionComplete {
                tool_call_id,
                result,
                ..
            } => Some(match result {
                ToolCallResult::Success { .. } => format!("  ✓ Completed: {tool_call_id}\n"),
                ToolCallResult::Failure { .. } => {
                    format!("  ✗ Failed: {tool_call_id} ({})\n", result.log_text())
                }
            }),
        }
    }
}
