//! # Controller Configuration
//!
//! Controller-level configuration loaded from environment variables once at startup.
//!
//! All configuration has sensible defaults and can be overridden via environment variables.
//! The loaded values are handed to the reconciler explicitly; nothing here is global.

mod controller;
mod server;

pub use controller::{parse_label_list, ControllerConfig, IMAGE_ENV};
pub use server::ServerConfig;

/// Load configuration from environment variables with defaults
pub fn load_config() -> (ControllerConfig, ServerConfig) {
    (ControllerConfig::from_env(), ServerConfig::from_env())
}

/// Read a value through `lookup` or return the default
pub(crate) fn var_or_default<T, F>(lookup: &F, key: &str, default: T) -> T
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
