//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` to match the JSON file
//! format and `#[serde(default)]` so partial files are accepted.

mod session;

pub use session::*;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type.
///
/// ```json
/// {
///   "client": { "defaultModel": "gpt-5" },
///   "session": { "toolTimeoutMs": 30000 }
/// }
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KiteSettings {
    /// Settings schema version.
    pub version: String,
    /// Application name.
    pub name: String,
    /// Client and backend connection settings.
    pub client: ClientSettings,
    /// Session runtime timeouts.
    pub session: SessionSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl Default for KiteSettings {
    fn default() -> Self {
        Self {
            version: kite_core::constants::VERSION.to_string(),
            name: kite_core::constants::NAME.to_string(),
            client: ClientSettings::default(),
            session: SessionSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl KiteSettings {
    /// Reject values the runtime cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.client.default_model.trim().is_empty() {
            return Err(SettingsError::invalid("client.defaultModel", "must not be empty"));
        }
        if self.client.backend_command.as_ref().is_some_and(Vec::is_empty) {
            return Err(SettingsError::invalid(
                "client.backendCommand",
                "must name a program",
            ));
        }
        self.session.validate()
    }
}

/// Client and backend connection settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientSettings {
    /// Model used when a session config does not name one.
    pub default_model: String,
    /// Whether sessions request streamed deltas by default.
    pub streaming: bool,
    /// Program and arguments of a stdio backend. `None` selects the built-in
    /// echo backend.
    pub backend_command: Option<Vec<String>>,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            default_model: kite_core::constants::DEFAULT_MODEL.to_string(),
            streaming: true,
            backend_command: None,
        }
    }
}

/// Logging configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Minimum level (`RUST_LOG` still wins when set).
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            json: false,
        }
    }
}
