//! Package-level constants.

/// Current version of Kite (sourced from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Package name.
pub const NAME: &str = "kite";

/// Model used when neither the session config nor settings name one.
pub const DEFAULT_MODEL: &str = "gpt-4.1";
