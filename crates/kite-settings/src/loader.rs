//! Layered settings: compiled defaults, then the user file, then `KITE_*`
//! environment variables.
//!
//! The user file is merged over the defaults key by key, so it only needs to
//! name what it changes. Nested objects merge recursively; arrays and scalars
//! replace; explicit `null` leaves the default in place.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{Result, SettingsError};
use crate::types::KiteSettings;

/// Settings file location: `$KITE_SETTINGS`, else `~/.kite/settings.json`.
pub fn settings_path() -> PathBuf {
    if let Some(explicit) = non_empty_var("KITE_SETTINGS") {
        return PathBuf::from(explicit);
    }
    let home = non_empty_var("HOME").unwrap_or_else(|| "/tmp".to_owned());
    [home.as_str(), ".kite", "settings.json"].iter().collect()
}

/// Load from [`settings_path`] and the process environment.
pub fn load_settings() -> Result<KiteSettings> {
    load_settings_from_path(&settings_path())
}

/// Load from `path` and the process environment, then validate.
///
/// A missing file is not an error; every other read or parse failure is.
pub fn load_settings_from_path(path: &Path) -> Result<KiteSettings> {
    let mut merged = serde_json::to_value(KiteSettings::default()).map_err(|source| {
        SettingsError::Parse {
            path: PathBuf::new(),
            source,
        }
    })?;

    match std::fs::read_to_string(path) {
        Ok(text) => {
            let user: Value = serde_json::from_str(&text).map_err(|source| SettingsError::Parse {
                path: path.to_owned(),
                source,
            })?;
            debug!(path = %path.display(), "settings file loaded");
            deep_merge(&mut merged, user);
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "no settings file, using defaults");
        }
        Err(source) => {
            return Err(SettingsError::Read {
                path: path.to_owned(),
                source,
            });
        }
    }

    let mut settings: KiteSettings =
        serde_json::from_value(merged).map_err(|source| SettingsError::Parse {
            path: path.to_owned(),
            source,
        })?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

/// Merge `overlay` into `base` in place.
pub fn deep_merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (_, Value::Null) => {}
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(slot) => deep_merge(slot, value),
                    None if value.is_null() => {}
                    None => {
                        let _ = base.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

// ─── Environment overrides ──────────────────────────────────────────────────

type Override = fn(&mut KiteSettings, &str) -> bool;

/// Every recognised variable and how it applies. An entry returns `false`
/// when the value does not parse.
const OVERRIDES: &[(&str, Override)] = &[
    ("KITE_DEFAULT_MODEL", |s, v| {
        v.clone_into(&mut s.client.default_model);
        true
    }),
    ("KITE_STREAMING", |s, v| set(&mut s.client.streaming, parse_bool(v))),
    ("KITE_BACKEND_COMMAND", |s, v| {
        let argv: Vec<String> = v.split_whitespace().map(str::to_owned).collect();
        !argv.is_empty() && {
            s.client.backend_command = Some(argv);
            true
        }
    }),
    ("KITE_SEND_TIMEOUT_MS", |s, v| {
        set(&mut s.session.send_timeout_ms, parse_u64_range(v, 1, 86_400_000))
    }),
    ("KITE_TOOL_TIMEOUT_MS", |s, v| {
        set(&mut s.session.tool_timeout_ms, parse_u64_range(v, 1, 86_400_000))
    }),
    ("KITE_TOOL_DRAIN_TIMEOUT_MS", |s, v| {
        set(&mut s.session.tool_drain_timeout_ms, parse_u64_range(v, 0, 3_600_000))
    }),
    ("KITE_LOG_LEVEL", |s, v| {
        v.clone_into(&mut s.logging.level);
        true
    }),
    ("KITE_LOG_JSON", |s, v| set(&mut s.logging.json, parse_bool(v))),
];

fn set<T>(slot: &mut T, parsed: Option<T>) -> bool {
    match parsed {
        Some(value) => {
            *slot = value;
            true
        }
        None => false,
    }
}

/// Apply `KITE_*` variables from the process environment.
pub fn apply_env_overrides(settings: &mut KiteSettings) {
    apply_overrides(settings, |key| std::env::var(key).ok());
}

/// Apply overrides from `lookup`. Unset and empty variables are skipped;
/// unparseable ones are logged and skipped.
pub fn apply_overrides<F>(settings: &mut KiteSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    for (key, apply) in OVERRIDES {
        let Some(value) = lookup(key).filter(|v| !v.trim().is_empty()) else {
            continue;
        };
        if apply(settings, value.trim()) {
            debug!(key, "settings override applied");
        } else {
            warn!(key, value = %value, "ignoring invalid settings override");
        }
    }
}

/// `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`, any case.
pub fn parse_bool(val: &str) -> Option<bool> {
    let val = val.to_ascii_lowercase();
    if ["true", "1", "yes", "on"].contains(&val.as_str()) {
        Some(true)
    } else if ["false", "0", "no", "off"].contains(&val.as_str()) {
        Some(false)
    } else {
        None
    }
}

/// Integer in `min..=max`.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    val.parse::<u64>().ok().filter(|n| (min..=max).contains(n))
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use serde_json::json;

    use super::*;

    fn overridden(vars: &[(&str, &str)]) -> KiteSettings {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        let mut settings = KiteSettings::default();
        apply_overrides(&mut settings, |key| vars.get(key).cloned());
        settings
    }

    fn write_settings(body: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, body).unwrap();
        (dir, path)
    }

    #[test]
    fn merge_recurses_into_objects() {
        let mut base = json!({"session": {"toolTimeoutMs": 1, "sendTimeoutMs": 2}});
        deep_merge(&mut base, json!({"session": {"toolTimeoutMs": 9}}));
        assert_eq!(base, json!({"session": {"toolTimeoutMs": 9, "sendTimeoutMs": 2}}));
    }

    #[test]
    fn merge_skips_null_and_replaces_arrays() {
        let mut base = json!({"a": 1, "cmd": ["x", "y"]});
        deep_merge(&mut base, json!({"a": null, "cmd": ["z"], "b": null}));
        assert_eq!(base, json!({"a": 1, "cmd": ["z"]}));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let settings = load_settings_from_path(Path::new("/nonexistent/kite/settings.json")).unwrap();
        assert_eq!(settings.session.tool_drain_timeout_ms, 5_000);
        assert_eq!(settings.client.default_model, "gpt-4.1");
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let (_dir, path) = write_settings(
            r#"{"client": {"defaultModel": "gpt-5", "backendCommand": ["assistant-server", "--stdio"]}}"#,
        );
        let settings = load_settings_from_path(&path).unwrap();
        assert_eq!(settings.client.default_model, "gpt-5");
        assert_eq!(
            settings.client.backend_command,
            Some(vec!["assistant-server".to_owned(), "--stdio".to_owned()])
        );
        assert!(settings.client.streaming);
        assert_eq!(settings.session.send_timeout_ms, 60_000);
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let (_dir, path) = write_settings("{not json");
        let err = load_settings_from_path(&path).unwrap_err();
        assert!(matches!(err, SettingsError::Parse { path: ref p, .. } if *p == path));
    }

    #[test]
    fn wrong_type_is_a_parse_error() {
        let (_dir, path) = write_settings(r#"{"session": {"toolTimeoutMs": "soon"}}"#);
        assert!(matches!(
            load_settings_from_path(&path),
            Err(SettingsError::Parse { .. })
        ));
    }

    #[test]
    fn zero_send_timeout_is_rejected() {
        let (_dir, path) = write_settings(r#"{"session": {"sendTimeoutMs": 0}}"#);
        let err = load_settings_from_path(&path).unwrap_err();
        assert_eq!(err.field(), Some("session.sendTimeoutMs"));
    }

    #[test]
    fn env_overrides_apply() {
        let s = overridden(&[
            ("KITE_DEFAULT_MODEL", "gpt-5"),
            ("KITE_STREAMING", "off"),
            ("KITE_BACKEND_COMMAND", "assistant-server  --stdio"),
            ("KITE_TOOL_DRAIN_TIMEOUT_MS", "0"),
            ("KITE_LOG_JSON", "yes"),
        ]);
        assert_eq!(s.client.default_model, "gpt-5");
        assert!(!s.client.streaming);
        assert_eq!(
            s.client.backend_command,
            Some(vec!["assistant-server".to_owned(), "--stdio".to_owned()])
        );
        assert_eq!(s.session.tool_drain_timeout_ms, 0);
        assert!(s.logging.json);
    }

    #[test]
    fn invalid_and_empty_overrides_are_ignored() {
        let s = overridden(&[
            ("KITE_STREAMING", "sometimes"),
            ("KITE_SEND_TIMEOUT_MS", "0"),
            ("KITE_TOOL_TIMEOUT_MS", "ten"),
            ("KITE_DEFAULT_MODEL", "   "),
        ]);
        let defaults = KiteSettings::default();
        assert_eq!(s.client.streaming, defaults.client.streaming);
        assert_eq!(s.session.send_timeout_ms, defaults.session.send_timeout_ms);
        assert_eq!(s.session.tool_timeout_ms, defaults.session.tool_timeout_ms);
        assert_eq!(s.client.default_model, defaults.client.default_model);
    }

    #[test]
    fn parse_bool_variants() {
        assert_eq!(parse_bool("YES"), Some(true));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn parse_u64_range_bounds() {
        assert_eq!(parse_u64_range("5", 1, 10), Some(5));
        assert_eq!(parse_u64_range("0", 1, 10), None);
        assert_eq!(parse_u64_range("11", 1, 10), None);
        assert_eq!(parse_u64_range("-1", 0, 10), None);
    }
}
