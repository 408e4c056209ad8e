//! Runtime types: lifecycle states, options, and session configuration.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use kite_core::constants::DEFAULT_MODEL;
use kite_core::ids::ToolCallId;
use kite_settings::KiteSettings;
use kite_tools::KiteTool;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ─────────────────────────────────────────────────────────────────────────────
// Lifecycle states
// ─────────────────────────────────────────────────────────────────────────────

/// Session lifecycle state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Registered with the backend, no traffic yet.
    Created,
    /// A turn is running.
    Active,
    /// No outstanding generation or tool work.
    Idle,
    /// The last turn failed; another `send` recovers.
    Error,
    /// Terminal; no further operations are accepted.
    Destroyed,
}

impl SessionState {
    /// Whether `send` is accepted in this state.
    #[must_use]
    pub fn accepts_send(self) -> bool {
        matches!(self, Self::Created | Self::Idle | Self::Error)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Active => write!(f, "active"),
            Self::Idle => write!(f, "idle"),
            Self::Error => write!(f, "error"),
            Self::Destroyed => write!(f, "destroyed"),
        }
    }
}

/// Client connection lifecycle state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientState {
    /// Constructed, never started.
    Uninitialized,
    /// Connection open; sessions may be created.
    Started,
    /// Stopped; every owned session has been destroyed.
    Stopped,
}

impl fmt::Display for ClientState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "uninitialized"),
            Self::Started => write!(f, "started"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tool calls
// ─────────────────────────────────────────────────────────────────────────────

/// Progress of a model-requested tool call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallState {
    /// Observed, handler not yet scheduled.
    Requested,
    /// Handler running on its own task.
    Running,
    /// Handler returned output.
    Completed,
    /// Handler failed, timed out, or was abandoned.
    Failed,
}

/// Snapshot of a tool call the session is still waiting on.
#[derive(Clone, Debug, PartialEq)]
pub struct PendingToolCall {
    /// Call ID.
    pub tool_call_id: ToolCallId,
    /// Requested tool.
    pub tool_name: String,
    /// Handler input.
    pub arguments: Value,
    /// Current progress.
    pub state: ToolCallState,
}

// ─────────────────────────────────────────────────────────────────────────────
// Options
// ─────────────────────────────────────────────────────────────────────────────

/// Timeouts applied by every session of a client.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionOptions {
    /// Default bound for `send_and_wait` and `wait_for_idle`.
    pub send_timeout: Duration,
    /// Default budget for one tool handler invocation.
    pub tool_timeout: Duration,
    /// How long `destroy` waits for pending tool calls.
    pub tool_drain_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from(&kite_settings::SessionSettings::default())
    }
}

impl From<&kite_settings::SessionSettings> for SessionOptions {
    fn from(settings: &kite_settings::SessionSettings) -> Self {
        Self {
            send_timeout: settings.send_timeout(),
            tool_timeout: settings.tool_timeout(),
            tool_drain_timeout: settings.tool_drain_timeout(),
        }
    }
}

/// Client-wide defaults, usually derived from [`KiteSettings`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientOptions {
    /// Model used when a session config does not name one.
    pub default_model: String,
    /// Streaming flag used when a session config does not set one.
    pub streaming: bool,
    /// Session timeouts.
    pub session: SessionOptions,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            default_model: DEFAULT_MODEL.to_owned(),
            streaming: true,
            session: SessionOptions::default(),
        }
    }
}

impl ClientOptions {
    /// Build options from loaded settings.
    #[must_use]
    pub fn from_settings(settings: &KiteSettings) -> Self {
        Self {
            default_model: settings.client.default_model.clone(),
            streaming: settings.client.streaming,
            session: SessionOptions::from(&settings.session),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration for `Client::create_session`.
#[derive(Clone, Default)]
pub struct SessionConfig {
    /// Model identifier; the client default when `None`.
    pub model: Option<String>,
    /// Streaming flag; the client default when `None`.
    pub streaming: Option<bool>,
    /// Tools, in announcement order.
    pub tools: Vec<Arc<dyn KiteTool>>,
}

impl SessionConfig {
    /// Empty configuration using client defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the model.
    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the streaming flag.
    #[must_use]
    pub fn streaming(mut self, streaming: bool) -> Self {
        self.streaming = Some(streaming);
        self
    }

    /// Append a tool.
    #[must_use]
    pub fn tool(mut self, tool: Arc<dyn KiteTool>) -> Self {
        self.tools.push(tool);
        self
    }
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.tools.iter().map(|t| t.name()).collect();
        f.debug_struct("SessionConfig")
            .field("model", &self.model)
            .field("streaming", &self.streaming)
            .field("tools", &names)
            .finish()
    }
}

/// Per-call overrides for `send`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SendOptions {
    /// Model for this turn only.
    pub model: Option<String>,
    /// Wait bound for `send_and_wait`; the session default when `None`.
    pub timeout: Option<Duration>,
}
