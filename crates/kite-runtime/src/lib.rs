//! # kite-runtime
//!
//! Session runtime for a remote assistant backend.
//!
//! - **Connection**: opaque channel to the backend ([`connection::Connection`]),
//!   with in-process and child-process implementations
//! - **Event bus**: ordered per-session fan-out to subscriber callbacks
//! - **Session**: the `Created → Active → Idle/Error → Destroyed` state machine,
//!   its message log, and tool dispatch
//! - **Client**: owns one connection and the sessions created over it
//! - **Orchestrator**: sequential chaining of independent client/session pairs

#![deny(unsafe_code)]

pub mod client;
pub mod connection;
pub mod errors;
pub mod event_bus;
pub mod orchestrator;
pub mod session;
pub mod types;

pub use client::Client;
pub use connection::{
    Connection, ConnectionError, InboundFrame, LoopbackConnection, OutboundRequest,
    StdioConnection,
};
pub use errors::RuntimeError;
pub use event_bus::{EventBus, EventCallback, SubscriptionHandle};
pub use orchestrator::{ChainStage, StageReport, run_chain};
pub use session::Session;
pub use types::{
    ClientOptions, ClientState, PendingToolCall, SendOptions, SessionConfig, SessionOptions,
    SessionState, ToolCallState,
};
