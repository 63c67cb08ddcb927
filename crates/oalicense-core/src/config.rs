//! Configuration for license lookups
//!
//! One immutable structure is built at start-up and shared by the pipeline,
//! the worker pool and the server. Durations are stored in whole seconds so
//! the TOML/JSON forms stay readable.

use std::time::Duration;

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// System-wide configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LicenseConfig {
    /// Cache expiry and staleness
    pub cache: CacheConfig,
    /// Detector execution settings
    pub detection: DetectionConfig,
    /// HTTP front door settings
    pub server: ServerConfig,
}

/// Cache configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Expiry applied to every cache write, in seconds
    pub ttl_seconds: u64,
    /// Age after which a license determination is no longer trusted, in seconds
    pub stale_window_seconds: u64,
    /// Expiry of the marker written while an identifier waits for the workers, in seconds
    pub queued_ttl_seconds: u64,
    /// Interval between sweeps that evict expired entries, in seconds
    pub purge_interval_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: 7_776_000,           // ~3 months
            stale_window_seconds: 15_552_000, // ~6 months
            queued_ttl_seconds: 3600,
            purge_interval_seconds: 600,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    pub fn queued_ttl(&self) -> Duration {
        Duration::from_secs(self.queued_ttl_seconds)
    }

    pub fn purge_interval(&self) -> Duration {
        Duration::from_secs(self.purge_interval_seconds)
    }

    pub fn stale_window(&self) -> TimeDelta {
        i64::try_from(self.stale_window_seconds)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .unwrap_or(TimeDelta::MAX)
    }
}

/// What to report when no provider detector recognises an identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoProviderPolicy {
    /// Report as resolved, recording that no license could be obtained
    #[default]
    Resolve,
    /// Report as an error
    Error,
}

/// Detector execution configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Upper bound on a single detector stage, in seconds
    pub timeout_seconds: u64,
    /// Maximum number of identifiers worked on concurrently
    pub workers: usize,
    /// Outcome when no provider is found
    pub no_provider: NoProviderPolicy,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            workers: 8,
            no_provider: NoProviderPolicy::Resolve,
        }
    }
}

impl DetectionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address
    pub addr: String,
    /// Maximum identifiers accepted in one batch
    pub lookup_limit: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8080".to_string(),
            lookup_limit: 1000,
        }
    }
}

impl LicenseConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml_str).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Serialize configuration to TOML
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Load configuration from a JSON string
    pub fn from_json(json_str: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json_str).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Serialize configuration to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache.ttl_seconds == 0 {
            return Err(ConfigError::OutOfRange(
                "cache.ttl_seconds must be positive".to_string(),
            ));
        }

        if self.cache.stale_window_seconds == 0 {
            return Err(ConfigError::OutOfRange(
                "cache.stale_window_seconds must be positive".to_string(),
            ));
        }

        if self.cache.queued_ttl_seconds == 0 {
            return Err(ConfigError::OutOfRange(
                "cache.queued_ttl_seconds must be positive".to_string(),
            ));
        }

        if self.cache.purge_interval_seconds == 0 {
            return Err(ConfigError::OutOfRange(
                "cache.purge_interval_seconds must be positive".to_string(),
            ));
        }

        if self.detection.timeout_seconds == 0 {
            return Err(ConfigError::OutOfRange(
                "detection.timeout_seconds must be positive".to_string(),
            ));
        }

        if self.detection.workers == 0 {
            return Err(ConfigError::OutOfRange(
                "detection.workers must be positive".to_string(),
            ));
        }

        if self.server.lookup_limit == 0 {
            return Err(ConfigError::OutOfRange(
                "server.lookup_limit must be positive".to_string(),
            ));
        }

        Ok(())
    }
}
