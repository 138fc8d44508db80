//! Configuration types for the reminder engine.

use crate::notify::LeadTime;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration, persisted as `config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TracksideConfig {
    /// Local reminder scheduling settings.
    pub notifications: NotificationsConfig,
}

/// Local reminder scheduling configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationsConfig {
    /// Minutes-before-start expressed in seconds. There is deliberately no
    /// default: callers that leave this unset must pass a lead time per call.
    pub lead_time_secs: Option<u64>,
    /// Persisted schedule file. `None` resolves to
    /// [`crate::trackside_dirs::schedule_store_file`].
    pub store_path: Option<PathBuf>,
    /// Interval between background resync passes (0 disables the task).
    pub health_check_interval_secs: u64,
    /// UTC offset of the venue, used to resolve naive wall-clock start times.
    pub venue_utc_offset_minutes: i32,
    /// Foreground presentation handed to the notification capability.
    pub presentation: PresentationOptions,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            lead_time_secs: None,
            store_path: None,
            health_check_interval_secs: 900,
            venue_utc_offset_minutes: 0,
            presentation: PresentationOptions::default(),
        }
    }
}

impl NotificationsConfig {
    /// Configured lead time, if any.
    pub fn lead_time(&self) -> Option<LeadTime> {
        self.lead_time_secs.map(LeadTime::from_secs)
    }

    /// Effective store path.
    pub fn effective_store_path(&self) -> PathBuf {
        self.store_path
            .clone()
            .unwrap_or_else(crate::trackside_dirs::schedule_store_file)
    }
}

/// How an alert is presented while the app is in the foreground.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PresentationOptions {
    /// Show a banner for alerts that fire in the foreground.
    pub show_banner: bool,
    /// Play the alert sound in the foreground.
    pub play_sound: bool,
}

impl Default for PresentationOptions {
    fn default() -> Self {
        Self {
            show_banner: true,
            play_sound: true,
        }
    }
}

impl TracksideConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::error::TracksideError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::TracksideError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> PathBuf {
        crate::trackside_dirs::config_file()
    }
}
