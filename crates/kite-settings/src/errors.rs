//! Settings errors.

use std::path::PathBuf;

use thiserror::Error;

/// Why settings could not be loaded.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file exists but could not be read.
    #[error("cannot read {}: {source}", path.display())]
    Read {
        /// File that failed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The settings file is not valid JSON, or does not match the schema.
    #[error("malformed settings in {}: {source}", path.display())]
    Parse {
        /// File that failed; empty for in-memory values.
        path: PathBuf,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// A value is out of range.
    #[error("{field} {reason}")]
    InvalidValue {
        /// camelCase path of the offending key, e.g. `session.sendTimeoutMs`.
        field: &'static str,
        /// What is wrong with it.
        reason: &'static str,
    },
}

impl SettingsError {
    pub(crate) fn invalid(field: &'static str, reason: &'static str) -> Self {
        Self::InvalidValue { field, reason }
    }

    /// The offending key, for `InvalidValue`.
    pub fn field(&self) -> Option<&'static str> {
        match self {
            Self::InvalidValue { field, .. } => Some(*field),
            Self::Read { .. } | Self::Parse { .. } => None,
        }
    }
}

/// Settings result.
pub type Result<T> = std::result::Result<T, SettingsError>;
