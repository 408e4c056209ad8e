//! The tool trait and its execution context.

use async_trait::async_trait;
use kite_core::ids::{SessionId, ToolCallId};
use kite_core::tools::ToolDefinition;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::errors::ToolError;

/// Execution context passed to every tool invocation.
#[derive(Clone, Debug)]
pub struct ToolContext {
    /// ID of this tool call.
    pub tool_call_id: ToolCallId,
    /// Session that requested the call.
    pub session_id: SessionId,
    /// Cancelled when the call is abandoned (timeout or session destroy).
    pub cancellation: CancellationToken,
}

/// A capability the model may ask the runtime to invoke.
///
/// Handlers may perform arbitrary I/O and are invoked concurrently with other
/// tools' handlers, each on its own task.
#[async_trait]
pub trait KiteTool: Send + Sync {
    /// Tool name, the exact string the model uses to request it.
    fn name(&self) -> &str;

    /// Schema announced to the backend.
    fn definition(&self) -> ToolDefinition;

    /// Optional per-tool timeout in milliseconds, overriding the session default.
    fn timeout_ms(&self) -> Option<u64> {
        None
    }

    /// Run the tool with JSON input.
    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<String, ToolError>;
}
