// SPDX-License-Identifier: GPL-3.0-only

//! User configuration
//!
//! Stored as JSON in `<config dir>/service-bay/config.json`. Every field has a
//! default so partial files from older versions keep loading.

use crate::backends::camera::CameraBackendType;
use crate::constants::timing;
use crate::errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Connection settings for the hosted relational database
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Project URL (e.g. `https://xyz.example.co`)
    pub url: String,
    /// Public API key sent as `apikey` and bearer token
    pub api_key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the analysis and feed API
    pub backend_url: String,
    /// Service session the captures and sensor record belong to
    pub session_id: Option<String>,
    /// Ask the analysis endpoint to persist captures
    pub persist_captures: bool,
    /// Local camera backend
    pub camera_backend: CameraBackendType,
    /// Image directory used by the `Files` camera backend
    pub camera_dir: Option<PathBuf>,
    /// Hosted database for sensor polling (disabled when unset)
    pub database: Option<DatabaseConfig>,
    pub feed_poll_interval_ms: u64,
    pub auto_capture_interval_ms: u64,
    pub sensor_poll_interval_ms: u64,
    pub analysis_timeout_secs: u64,
    pub device_settle_ms: u64,
    /// Remote frames older than this mark the station as disconnected
    pub feed_freshness_secs: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend_url: "http://localhost:8000".to_string(),
            session_id: None,
            persist_captures: true,
            camera_backend: CameraBackendType::default(),
            camera_dir: None,
            database: None,
            feed_poll_interval_ms: timing::FEED_POLL_INTERVAL.as_millis() as u64,
            auto_capture_interval_ms: timing::AUTO_CAPTURE_INTERVAL.as_millis() as u64,
            sensor_poll_interval_ms: timing::SENSOR_POLL_INTERVAL.as_millis() as u64,
            analysis_timeout_secs: timing::ANALYSIS_TIMEOUT.as_secs(),
            device_settle_ms: timing::DEVICE_SETTLE_DELAY.as_millis() as u64,
            feed_freshness_secs: timing::FEED_FRESHNESS_SECS,
        }
    }
}

impl Config {
    /// Default location of the config file
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("service-bay").join("config.json"))
    }

    /// Load from the default location, falling back to defaults
    pub fn load() -> AppResult<Self> {
        match Self::default_path() {
            Some(path) => Self::load_from(&path),
            None => {
                debug!("No config directory available, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Load from `path`; a missing file yields the defaults
    pub fn load_from(path: &Path) -> AppResult<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "Config file missing, using defaults");
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&text)?;
        info!(path = %path.display(), "Loaded configuration");
        config.validate()?;
        Ok(config)
    }

    /// Write as pretty JSON, creating parent directories
    pub fn save_to(&self, path: &Path) -> AppResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Reject settings that would stall the timers
    pub fn validate(&self) -> AppResult<()> {
        if self.feed_poll_interval_ms == 0
            || self.auto_capture_interval_ms == 0
            || self.sensor_poll_interval_ms == 0
        {
            return Err(AppError::Config("poll intervals must be non-zero".into()));
        }
        if self.analysis_timeout_secs == 0 {
            return Err(AppError::Config(
                "analysis_timeout_secs must be non-zero".into(),
            ));
        }
        if !(self.feed_freshness_secs > 0.0) {
            return Err(AppError::Config(
                "feed_freshness_secs must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn feed_poll_interval(&self) -> Duration {
        Duration::from_millis(self.feed_poll_interval_ms)
    }

    pub fn auto_capture_interval(&self) -> Duration {
        Duration::from_millis(self.auto_capture_interval_ms)
    }

    pub fn sensor_poll_interval(&self) -> Duration {
        Duration::from_millis(self.sensor_poll_interval_ms)
    }

    pub fn analysis_timeout(&self) -> Duration {
        Duration::from_secs(self.analysis_timeout_secs)
    }

    pub fn device_settle_delay(&self) -> Duration {
        Duration::from_millis(self.device_settle_ms)
    }
}
