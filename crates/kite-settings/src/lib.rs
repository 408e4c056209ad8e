//! # kite-settings
//!
//! Configuration management with layered sources.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`KiteSettings::default()`]
//! 2. **User file**: `~/.kite/settings.json` (deep-merged over defaults),
//!    or the file named by `KITE_SETTINGS`
//! 3. **Environment variables**: `KITE_*` overrides (highest priority)
//!
//! There is no global instance: the binary loads settings once and passes
//! them into the runtime explicitly.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_overrides, deep_merge, load_settings, load_settings_from_path,
    settings_path,
};
pub use types::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_are_valid() {
        let settings = KiteSettings::default();
        assert_eq!(settings.name, "kite");
        assert_eq!(settings.client.default_model, "gpt-4.1");
        assert!(settings.client.streaming);
        assert!(settings.client.backend_command.is_none());
        assert_eq!(settings.session.send_timeout_ms, 60_000);
        assert_eq!(settings.session.tool_timeout_ms, 120_000);
        assert_eq!(settings.session.tool_drain_timeout_ms, 5_000);
        assert_eq!(settings.logging.level, "warn");
        assert!(settings.validate().is_ok());
    }
}
