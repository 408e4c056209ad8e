//! Tool error types.

use std::io;

use thiserror::Error;

/// Errors a tool handler can return.
///
/// The dispatcher turns every variant into a failed
/// `tool.execution_complete` event; none of them reach the caller of `send`.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Parameter validation failed.
    #[error("validation error: {message}")]
    Validation {
        /// Description of the validation failure.
        message: String,
    },

    /// Generic I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Operation timed out.
    #[error("timeout after {timeout_ms}ms")]
    Timeout {
        /// The timeout duration in milliseconds.
        timeout_ms: u64,
    },

    /// Operation was cancelled.
    #[error("cancelled")]
    Cancelled,

    /// Any other handler failure.
    #[error("{message}")]
    Internal {
        /// Description of the failure.
        message: String,
    },
}

impl ToolError {
    /// Convenience constructor for [`ToolError::Internal`].
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

/// Errors raised while building a session's tool registry.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// A tool with this name is already registered.
    #[error("duplicate tool name: {name}")]
    DuplicateName {
        /// The clashing name.
        name: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_display() {
        let err = ToolError::Validation {
            message: "missing field `directory`".into(),
        };
        assert_eq!(err.to_string(), "validation error: missing field `directory`");
    }

    #[test]
    fn timeout_display_includes_ms() {
        assert_eq!(
            ToolError::Timeout { timeout_ms: 5000 }.to_string(),
            "timeout after 5000ms"
        );
    }

    #[test]
    fn from_io_error() {
        let err = ToolError::from(io::Error::new(io::ErrorKind::NotFound, "gone"));
        assert!(matches!(err, ToolError::Io(_)));
        assert!(err.to_string().contains("gone"));
    }

    #[test]
    fn internal_is_bare_message() {
        assert_eq!(ToolError::internal("disk full").to_string(), "disk full");
    }

    #[test]
    fn duplicate_name_display() {
        let err = RegistryError::DuplicateName {
            name: "list_local_files".into(),
        };
        assert_eq!(err.to_string(), "duplicate tool name: list_local_files");
    }
}
