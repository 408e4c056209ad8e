//! Session runtime timeouts.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Session runtime settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionSettings {
    /// Upper bound for `send_and_wait` when the call does not override it.
    pub send_timeout_ms: u64,
    /// Per-invocation budget for tool handlers without their own timeout.
    pub tool_timeout_ms: u64,
    /// How long `destroy` waits for pending tool calls before abandoning them.
    pub tool_drain_timeout_ms: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            send_timeout_ms: 60_000,
            tool_timeout_ms: 120_000,
            tool_drain_timeout_ms: 5_000,
        }
    }
}

impl SessionSettings {
    /// `send_and_wait` bound.
    #[must_use]
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    /// Default tool handler budget.
    #[must_use]
    pub fn tool_timeout(&self) -> Duration {
        Duration::from_millis(self.tool_timeout_ms)
    }

    /// Destroy-time drain bound.
    #[must_use]
    pub fn tool_drain_timeout(&self) -> Duration {
        Duration::from_millis(self.tool_drain_timeout_ms)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.send_timeout_ms == 0 {
            return Err(SettingsError::invalid(
                "session.sendTimeoutMs",
                "must be greater than zero",
            ));
        }
        if self.tool_timeout_ms == 0 {
            return Err(SettingsError::invalid(
                "session.toolTimeoutMs",
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}
