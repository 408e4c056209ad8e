//! # kite-core
//!
//! Foundation types shared by every Kite crate:
//!
//! - **Branded IDs**: `SessionId`, `ToolCallId`, `MessageId` as newtypes for type safety
//! - **Events**: [`events::SessionEvent`] and the closed [`events::EventKind`] variant
//! - **Messages**: the append-only session log entries ([`messages::MessageEntry`])
//! - **Tools**: tool definitions and parameter schemas sent to the backend
//! - **Logging**: `tracing` subscriber setup and log capture for tests

#![deny(unsafe_code)]

pub mod constants;
pub mod events;
pub mod ids;
pub mod logging;
pub mod messages;
pub mod tools;
