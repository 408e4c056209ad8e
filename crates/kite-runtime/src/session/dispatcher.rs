//! Tool dispatcher: lookup → spawn → timeout/panic capture → outcome.
//!
//! Each handler runs on its own task so a slow tool never stalls event
//! delivery. Finished handlers report back through an outcome channel that
//! the session pump drains; the pump turns each outcome into the
//! `tool.execution_complete` event and the backend continuation.

use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use kite_core::events::{ToolCallResult, ToolFailureKind};
use kite_core::ids::{SessionId, ToolCallId};
use kite_tools::{KiteTool, ToolContext};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument, warn};

use crate::event_bus::panic_message;
use crate::types::{PendingToolCall, ToolCallState};

/// A finished handler invocation.
#[derive(Debug)]
pub(crate) struct ToolOutcome {
    pub tool_call_id: ToolCallId,
    pub tool_name: String,
    pub result: ToolCallResult,
}

/// What `dispatch` did with a request.
#[derive(Debug, PartialEq)]
pub(crate) enum Dispatch {
    /// Handler scheduled; an outcome will follow unless the call is abandoned.
    Spawned,
    /// Failed immediately; no handler runs.
    Rejected(ToolCallResult),
    /// The call ID is already pending; the request was dropped.
    Duplicate,
}

struct Pending {
    call: PendingToolCall,
    cancel: CancellationToken,
}

pub(crate) struct ToolDispatcher {
    session_id: SessionId,
    default_timeout: Duration,
    parent: CancellationToken,
    pending: Vec<Pending>,
    outcomes: mpsc::UnboundedSender<ToolOutcome>,
}

impl ToolDispatcher {
    pub(crate) fn new(
        session_id: SessionId,
        default_timeout: Duration,
        outcomes: mpsc::UnboundedSender<ToolOutcome>,
    ) -> Self {
        Self {
            session_id,
            default_timeout,
            parent: CancellationToken::new(),
            pending: Vec::new(),
            outcomes,
        }
    }

    /// Handle a `tool.execution_start` request.
    pub(crate) fn dispatch(
        &mut self,
        tool_call_id: &ToolCallId,
        tool_name: &str,
        arguments: &Value,
        tool: Option<Arc<dyn KiteTool>>,
    ) -> Dispatch {
        if self.pending.iter().any(|p| &p.call.tool_call_id == tool_call_id) {
            warn!(session_id = %self.session_id, %tool_call_id, "duplicate tool call id dropped");
            return Dispatch::Duplicate;
        }
        let Some(tool) = tool else {
            warn!(session_id = %self.session_id, tool_name, "unknown tool requested");
            return Dispatch::Rejected(ToolCallResult::failure(
                ToolFailureKind::UnknownTool,
                format!("Tool not found: {tool_name}"),
            ));
        };

        let cancel = self.parent.child_token();
        let timeout = tool
            .timeout_ms()
            .map_or(self.default_timeout, Duration::from_millis);
        let ctx = ToolContext {
            tool_call_id: tool_call_id.clone(),
            session_id: self.session_id.clone(),
            cancellation: cancel.clone(),
        };
        let mut call = PendingToolCall {
            tool_call_id: tool_call_id.clone(),
            tool_name: tool_name.to_owned(),
            arguments: arguments.clone(),
            state: ToolCallState::Requested,
        };

        let _handle = tokio::spawn(run_tool(
            tool,
            ctx,
            arguments.clone(),
            timeout,
            self.outcomes.clone(),
        ));
        call.state = ToolCallState::Running;
        debug!(session_id = %self.session_id, %tool_call_id, tool_name, "tool handler spawned");
        self.pending.push(Pending { call, cancel });
        Dispatch::Spawned
    }

    /// Retire a pending call. Returns `false` if it was not pending (already
    /// abandoned, or never dispatched).
    pub(crate) fn complete(&mut self, tool_call_id: &ToolCallId) -> bool {
        let Some(pos) = self
            .pending
            .iter()
            .position(|p| &p.call.tool_call_id == tool_call_id)
        else {
            return false;
        };
        let _ = self.pending.remove(pos);
        true
    }

    /// Cancel every pending call and hand them back for failure reporting.
    pub(crate) fn abandon_all(&mut self) -> Vec<PendingToolCall> {
        self.parent.cancel();
        self.pending
            .drain(..)
            .map(|p| {
                p.cancel.cancel();
                PendingToolCall {
                    state: ToolCallState::Failed,
                    ..p.call
                }
            })
            .collect()
    }

    pub(crate) fn pending(&self) -> Vec<PendingToolCall> {
        self.pending.iter().map(|p| p.call.clone()).collect()
    }

    pub(crate) fn is_idle(&self) -> bool {
        self.pending.is_empty()
    }
}

#[instrument(skip_all, fields(session_id = %ctx.session_id, tool_call_id = %ctx.tool_call_id, tool_name = tool.name()))]
async fn run_tool(
    tool: Arc<dyn KiteTool>,
    ctx: ToolContext,
    arguments: Value,
    timeout: Duration,
    outcomes: mpsc::UnboundedSender<ToolOutcome>,
) {
    let cancel = ctx.cancellation.clone();
    let run = std::panic::AssertUnwindSafe(tool.execute(arguments, &ctx)).catch_unwind();

    let outcome = tokio::select! {
        biased;
        () = cancel.cancelled() => {
            debug!("tool call cancelled");
            return;
        }
        r = tokio::time::timeout(timeout, run) => r,
    };

    let result = match outcome {
        Ok(Ok(Ok(output))) => ToolCallResult::success(output),
        Ok(Ok(Err(e))) => {
            debug!(error = %e, "tool handler failed");
            ToolCallResult::failure(ToolFailureKind::Handler, e.to_string())
        }
        Ok(Err(panic)) => {
            let msg = panic_message(panic.as_ref());
            error!(panic = %msg, "tool panicked during execution");
            ToolCallResult::failure(ToolFailureKind::Handler, format!("tool panicked: {msg}"))
        }
        Err(_) => {
            let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
            warn!(timeout_ms, "tool timed out");
            ToolCallResult::failure(
                ToolFailureKind::Timeout,
                format!("timed out after {timeout_ms}ms"),
            )
        }
    };

    let _ = outcomes.send(ToolOutcome {
        tool_call_id: ctx.tool_call_id.clone(),
        tool_name: tool.name().to_owned(),
        result,
    });
}
