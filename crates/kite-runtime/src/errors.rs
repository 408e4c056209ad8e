//! Runtime error types.

use kite_core::ids::SessionId;
use kite_tools::RegistryError;

use crate::connection::ConnectionError;
use crate::types::SessionState;

/// Errors reported synchronously by the client, sessions, and the chain
/// orchestrator.
///
/// Failures local to one turn (tool failures, model errors, transport loss
/// mid-turn) are not in here: they arrive as events on the session's bus.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// The operation is not valid in the session's current state.
    #[error("Invalid state: cannot {operation} session {session_id} while {state}")]
    InvalidState {
        /// Session the operation targeted.
        session_id: SessionId,
        /// State the session was in.
        state: SessionState,
        /// Operation that was rejected.
        operation: &'static str,
    },

    /// A turn is already running on this session.
    #[error("Session busy: {0}")]
    SessionBusy(SessionId),

    /// A tool with this name is already registered on the session.
    #[error("Duplicate tool name: {name}")]
    DuplicateToolName {
        /// The clashing name.
        name: String,
    },

    /// `create_session` before `start` or after `stop`.
    #[error("Client not started")]
    ClientNotStarted,

    /// `start` on a client that is already started.
    #[error("Client already started")]
    AlreadyStarted,

    /// Transport failure outside a turn (open, create-session).
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// No session with this ID is owned by the client.
    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),

    /// The awaited turn ended with `session.error`.
    #[error("Turn failed ({error_type}): {message}")]
    TurnFailed {
        /// Error category from the event.
        error_type: String,
        /// Message from the event.
        message: String,
    },

    /// The awaited turn did not end in time.
    #[error("Timed out after {waited_ms}ms waiting for the turn to end")]
    WaitTimeout {
        /// How long the caller waited.
        waited_ms: u64,
    },

    /// A chain stage failed; later stages were not run.
    #[error("Stage {stage} failed: {source}")]
    StageFailed {
        /// Name of the failing stage.
        stage: String,
        /// Underlying failure.
        #[source]
        source: Box<RuntimeError>,
    },
}

impl RuntimeError {
    /// Whether the caller can retry the same operation later.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::SessionBusy(_) | Self::TurnFailed { .. } | Self::WaitTimeout { .. } => true,
            Self::Connection(e) => e.is_transient(),
            Self::StageFailed { source, .. } => source.is_recoverable(),
            Self::InvalidState { .. }
            | Self::DuplicateToolName { .. }
            | Self::ClientNotStarted
            | Self::AlreadyStarted
            | Self::SessionNotFound(_) => false,
        }
    }

    /// Error category string, stable for logs and CLI output.
    pub fn category(&self) -> &'static str {
        match self {
            Self::InvalidState { .. } => "invalid_state",
            Self::SessionBusy(_) => "session_busy",
            Self::DuplicateToolName { .. } => "duplicate_tool_name",
            Self::ClientNotStarted => "client_not_started",
            Self::AlreadyStarted => "already_started",
            Self::Connection(_) => "connection",
            Self::SessionNotFound(_) => "session_not_found",
            Self::TurnFailed { .. } => "turn_failed",
            Self::WaitTimeout { .. } => "wait_timeout",
            Self::StageFailed { .. } => "stage_failed",
        }
    }
}

impl From<RegistryError> for RuntimeError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::DuplicateName { name } => Self::DuplicateToolName { name },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_state_display() {
        let err = RuntimeError::InvalidState {
            session_id: SessionId::from("s1"),
            state: SessionState::Destroyed,
            operation: "send",
        };
        assert_eq!(
            err.to_string(),
            "Invalid state: cannot send session s1 while destroyed"
        );
    }

    #[test]
    fn category_strings() {
        assert_eq!(RuntimeError::ClientNotStarted.category(), "client_not_started");
        assert_eq!(RuntimeError::AlreadyStarted.category(), "already_started");
        assert_eq!(
            RuntimeError::SessionBusy(SessionId::from("s")).category(),
            "session_busy"
        );
        assert_eq!(
            RuntimeError::WaitTimeout { waited_ms: 10 }.category(),
            "wait_timeout"
        );
    }

    #[test]
    fn recoverable_classification() {
        assert!(RuntimeError::SessionBusy(SessionId::from("s")).is_recoverable());
        assert!(!RuntimeError::AlreadyStarted.is_recoverable());
        assert!(!RuntimeError::Connection(ConnectionError::NotOpen).is_recoverable());
        assert!(RuntimeError::Connection(ConnectionError::Closed).is_recoverable());
    }

    #[test]
    fn registry_error_converts() {
        let err: RuntimeError = RegistryError::DuplicateName {
            name: "list_local_files".into(),
        }
        .into();
        assert_eq!(err.to_string(), "Duplicate tool name: list_local_files");
    }

    #[test]
    fn stage_failed_keeps_source() {
        let err = RuntimeError::StageFailed {
            stage: "writer".into(),
            source: Box::new(RuntimeError::WaitTimeout { waited_ms: 500 }),
        };
        assert!(err.to_string().starts_with("Stage writer failed: Timed out"));
        assert!(err.is_recoverable());
    }
}
