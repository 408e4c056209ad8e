//! # kite-tools
//!
//! The tool contract consumed by the session runtime:
//!
//! - [`traits::KiteTool`]: name, definition, and an async handler
//! - [`registry::ToolRegistry`]: ordered, duplicate-rejecting name index
//! - [`function::FnTool`]: build a tool from a closure (optionally with typed
//!   parameters)
//!
//! Tool bodies themselves (listing files, moving files, ...) are supplied by
//! the embedding application.

#![deny(unsafe_code)]

pub mod errors;
pub mod function;
pub mod registry;
pub mod traits;

pub use errors::{RegistryError, ToolError};
pub use function::FnTool;
pub use registry::ToolRegistry;
pub use traits::{KiteTool, ToolContext};
