//! Segue configuration
//!
//! Defaults applied to every request built through [`SegueConfig::request`], plus
//! orchestrator tuning. Loaded from TOML.

use crate::error::ConfigError;
use crate::request::TransitionRequest;
use crate::types::{duration_ms, SceneKey, TransitionTimings};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Orchestrator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegueConfig {
    /// Loading screen used when a request has no override
    pub loading_screen: SceneKey,
    /// Default phase timings
    pub timings: TransitionTimings,
    /// Spill container defaults
    pub anti_spill: AntiSpillConfig,
    /// Scene to fall back to when a request names none
    pub fallback_destination: Option<SceneKey>,
    /// Bound on the cleanup phase after a failed or canceled run
    #[serde(with = "duration_ms", rename = "cleanup_timeout_ms")]
    pub cleanup_timeout: Duration,
    /// Smoothed progress speed, in progress units per second
    pub progress_smoothing: f32,
    /// Default `tracing` filter directive
    pub log_filter: String,
}

impl SegueConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With loading screen
    #[inline]
    #[must_use]
    pub fn with_loading_screen(mut self, key: impl Into<SceneKey>) -> Self {
        self.loading_screen = key.into();
        self
    }

    /// With default timings
    #[inline]
    #[must_use]
    pub fn with_timings(mut self, timings: TransitionTimings) -> Self {
        self.timings = timings;
        self
    }

    /// With spill container defaults
    #[inline]
    #[must_use]
    pub fn with_anti_spill(mut self, anti_spill: AntiSpillConfig) -> Self {
        self.anti_spill = anti_spill;
        self
    }

    /// With default fallback destination
    #[inline]
    #[must_use]
    pub fn with_fallback_destination(mut self, key: impl Into<SceneKey>) -> Self {
        self.fallback_destination = Some(key.into());
        self
    }

    /// With cleanup timeout
    #[inline]
    #[must_use]
    pub fn with_cleanup_timeout(mut self, timeout: Duration) -> Self {
        self.cleanup_timeout = timeout;
        self
    }

    /// Parse and validate TOML
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_toml_str(&source)?;
        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Reject values the orchestrator cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.loading_screen.as_str().is_empty() {
            return Err(ConfigError::Invalid {
                field: "loading_screen",
                reason: "must not be empty".to_string(),
            });
        }
        if self.anti_spill.name.is_empty() {
            return Err(ConfigError::Invalid {
                field: "anti_spill.name",
                reason: "must not be empty".to_string(),
            });
        }
        if self.anti_spill.poll_interval.is_zero() {
            return Err(ConfigError::Invalid {
                field: "anti_spill.poll_interval_ms",
                reason: "must be at least 1ms".to_string(),
            });
        }
        if !(self.progress_smoothing.is_finite() && self.progress_smoothing > 0.0) {
            return Err(ConfigError::Invalid {
                field: "progress_smoothing",
                reason: format!("must be a positive number, got {}", self.progress_smoothing),
            });
        }
        Ok(())
    }

    /// A request toward `destination` carrying this configuration's defaults
    #[must_use]
    pub fn request(&self, destination: impl Into<SceneKey>) -> TransitionRequest {
        let mut request = TransitionRequest::new(destination)
            .with_timings(self.timings)
            .with_anti_spill(self.anti_spill.enabled, Some(self.anti_spill.name.clone()));
        if let Some(fallback) = &self.fallback_destination {
            request = request.with_fallback(fallback.clone());
        }
        request
    }
}

impl Default for SegueConfig {
    fn default() -> Self {
        Self {
            loading_screen: SceneKey::new("loading"),
            timings: TransitionTimings::fades(Duration::from_millis(300)),
            anti_spill: AntiSpillConfig::default(),
            fallback_destination: None,
            cleanup_timeout: Duration::from_secs(10),
            progress_smoothing: 1.5,
            log_filter: "info".to_string(),
        }
    }
}

/// Spill container defaults
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AntiSpillConfig {
    /// Requests built from config isolate mid-load spawns
    pub enabled: bool,
    /// Container scene name
    pub name: String,
    /// Interval between unload completion polls
    #[serde(with = "duration_ms", rename = "poll_interval_ms")]
    pub poll_interval: Duration,
}

impl AntiSpillConfig {
    /// Container name used when nothing else is configured
    pub const DEFAULT_NAME: &'static str = "__segue_spill";
}

impl Default for AntiSpillConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            name: Self::DEFAULT_NAME.to_string(),
            poll_interval: Duration::from_millis(16),
        }
    }
}
