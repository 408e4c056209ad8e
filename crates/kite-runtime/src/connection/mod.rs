//! Backend connection: the opaque channel a client talks through.
//!
//! A [`Connection`] yields inbound frames (one [`EventKind`] addressed to a
//! session) and accepts outbound requests. The runtime never looks behind
//! it: the model, transport, and auth are the implementation's business.
//!
//! Two implementations ship with the runtime:
//!
//! - [`LoopbackConnection`]: in-process, scripted by a responder closure
//! - [`StdioConnection`]: newline-delimited JSON over a child process

mod loopback;
mod stdio;

pub use loopback::LoopbackConnection;
pub use stdio::StdioConnection;

use async_trait::async_trait;
use kite_core::events::{EventKind, ToolCallResult};
use kite_core::ids::{SessionId, ToolCallId};
use kite_core::tools::ToolDefinition;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

/// An event from the backend addressed to one session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundFrame {
    /// Target session.
    pub session_id: SessionId,
    /// Event payload.
    pub event: EventKind,
}

impl InboundFrame {
    /// Address `event` to `session_id`.
    #[must_use]
    pub fn new(session_id: SessionId, event: EventKind) -> Self {
        Self { session_id, event }
    }
}

/// A request to the backend.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params", rename_all_fields = "camelCase")]
pub enum OutboundRequest {
    /// Register a new session.
    #[serde(rename = "session.create")]
    CreateSession {
        /// Session ID chosen by the client.
        session_id: SessionId,
        /// Model identifier.
        model: String,
        /// Whether the backend should stream deltas.
        streaming: bool,
        /// Tools known at creation time.
        tools: Vec<ToolDefinition>,
    },

    /// Start a turn.
    #[serde(rename = "session.send")]
    Send {
        /// Target session.
        session_id: SessionId,
        /// User prompt.
        prompt: String,
        /// Model override for this turn.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model: Option<String>,
        /// Full tool list, present when it changed since the last announcement.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tools: Option<Vec<ToolDefinition>>,
    },

    /// Continuation input for a tool call the model requested.
    #[serde(rename = "session.tool_result")]
    ToolResult {
        /// Target session.
        session_id: SessionId,
        /// Call being answered.
        tool_call_id: ToolCallId,
        /// Output or failure.
        result: ToolCallResult,
    },

    /// Release the session.
    #[serde(rename = "session.destroy")]
    Destroy {
        /// Target session.
        session_id: SessionId,
    },
}

impl OutboundRequest {
    /// Session the request is about.
    #[must_use]
    pub fn session_id(&self) -> &SessionId {
        match self {
            Self::CreateSession { session_id, .. }
            | Self::Send { session_id, .. }
            | Self::ToolResult { session_id, .. }
            | Self::Destroy { session_id } => session_id,
        }
    }

    /// Wire method string.
    #[must_use]
    pub fn method(&self) -> &'static str {
        match self {
            Self::CreateSession { .. } => "session.create",
            Self::Send { .. } => "session.send",
            Self::ToolResult { .. } => "session.tool_result",
            Self::Destroy { .. } => "session.destroy",
        }
    }
}

/// Transport failures.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The peer went away.
    #[error("connection closed")]
    Closed,

    /// `send` before `open` (or after `close`).
    #[error("connection not open")]
    NotOpen,

    /// Process or pipe I/O failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A frame could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(String),
}

impl ConnectionError {
    /// Whether reopening the connection may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Closed | Self::Io(_))
    }
}

impl From<serde_json::Error> for ConnectionError {
    fn from(err: serde_json::Error) -> Self {
        Self::Codec(err.to_string())
    }
}

impl From<tokio_util::codec::LinesCodecError> for ConnectionError {
    fn from(err: tokio_util::codec::LinesCodecError) -> Self {
        match err {
            tokio_util::codec::LinesCodecError::Io(e) => Self::Io(e),
            tokio_util::codec::LinesCodecError::MaxLineLengthExceeded => {
                Self::Codec("max line length exceeded".into())
            }
        }
    }
}

/// Bidirectional channel to the backend, owned by exactly one client.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Open the channel and return the inbound frame stream.
    ///
    /// The stream ends when the backend goes away or [`Connection::close`] is
    /// called. A closed connection may be opened again.
    async fn open(&self) -> Result<mpsc::UnboundedReceiver<InboundFrame>, ConnectionError>;

    /// Deliver one request.
    async fn send(&self, request: OutboundRequest) -> Result<(), ConnectionError>;

    /// Release the channel. Idempotent.
    async fn close(&self);
}
