//! Application directory paths for trackside.
//!
//! Uses the [`dirs`] crate for platform-appropriate directory resolution.
//!
//! # Environment Overrides
//!
//! - `TRACKSIDE_DATA_DIR` overrides [`data_dir`]
//! - `TRACKSIDE_CONFIG_DIR` overrides [`config_dir`]

use std::path::PathBuf;

/// Application data root directory.
///
/// Holds the persisted notification schedule. Resolves to
/// `dirs::data_dir()/trackside/` by default.
#[must_use]
pub fn data_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("TRACKSIDE_DATA_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::data_dir()
        .map(|d| d.join("trackside"))
        .unwrap_or_else(|| PathBuf::from("/tmp/trackside-data"))
}

/// Application config directory.
///
/// Resolves to `dirs::config_dir()/trackside/` by default.
#[must_use]
pub fn config_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("TRACKSIDE_CONFIG_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::config_dir()
        .map(|d| d.join("trackside"))
        .unwrap_or_else(|| PathBuf::from("/tmp/trackside-config"))
}

/// Main config file path (`config_dir()/config.toml`).
#[must_use]
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}

/// Persisted notification schedule (`data_dir()/notification-schedule.json`).
#[must_use]
pub fn schedule_store_file() -> PathBuf {
    data_dir().join("notification-schedule.json")
}
