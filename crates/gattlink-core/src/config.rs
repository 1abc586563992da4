//! Connection timing configuration.
//!
//! [`LinkConfig`] can be built in code with the builder methods or loaded
//! from a TOML file. Durations are written in milliseconds:
//!
//! ```toml
//! probe_interval_ms = 5000
//! probe_timeout_ms = 3000
//! descriptor_write_timeout_ms = 5000
//! discovery_timeout_ms = 10000
//! teardown_timeout_ms = 10000
//! event_capacity = 100
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{Error, Result};

/// Default interval between keep-alive probes.
pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(5);

/// Default timeout for a single keep-alive probe.
const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Default timeout for one subscription descriptor write.
const DEFAULT_DESCRIPTOR_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default timeout for service or characteristic discovery.
const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Default deadline for the whole unsubscribe-then-disconnect sequence.
const DEFAULT_TEARDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Default capacity of the event broadcast channel.
const DEFAULT_EVENT_CAPACITY: usize = 100;

/// Timing configuration for a peripheral connection.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use gattlink_core::LinkConfig;
///
/// let config = LinkConfig::default()
///     .probe_interval(Duration::from_secs(2))
///     .descriptor_write_timeout(Duration::from_secs(1));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Interval between keep-alive probes while no subscription is active.
    #[serde(rename = "probe_interval_ms", with = "millis")]
    pub probe_interval: Duration,
    /// Timeout for a single keep-alive probe.
    #[serde(rename = "probe_timeout_ms", with = "millis")]
    pub probe_timeout: Duration,
    /// Timeout for one subscription descriptor write.
    #[serde(rename = "descriptor_write_timeout_ms", with = "millis")]
    pub descriptor_write_timeout: Duration,
    /// Timeout for one service or characteristic discovery call.
    #[serde(rename = "discovery_timeout_ms", with = "millis")]
    pub discovery_timeout: Duration,
    /// Deadline for disconnect when the caller does not supply one.
    #[serde(rename = "teardown_timeout_ms", with = "millis")]
    pub teardown_timeout: Duration,
    /// Capacity of the event broadcast channel.
    pub event_capacity: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            probe_interval: DEFAULT_PROBE_INTERVAL,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            descriptor_write_timeout: DEFAULT_DESCRIPTOR_WRITE_TIMEOUT,
            discovery_timeout: DEFAULT_DISCOVERY_TIMEOUT,
            teardown_timeout: DEFAULT_TEARDOWN_TIMEOUT,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl LinkConfig {
    /// Create a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a config for challenging RF environments.
    ///
    /// Uses longer timeouts to accommodate signal interference,
    /// thick walls, or long distances.
    pub fn challenging_environment() -> Self {
        Self {
            probe_timeout: Duration::from_secs(5),
            descriptor_write_timeout: Duration::from_secs(10),
            discovery_timeout: Duration::from_secs(15),
            teardown_timeout: Duration::from_secs(30),
            ..Self::default()
        }
    }

    /// Create a config for fast, reliable environments.
    pub fn fast() -> Self {
        Self {
            probe_interval: Duration::from_secs(3),
            probe_timeout: Duration::from_secs(2),
            descriptor_write_timeout: Duration::from_secs(2),
            discovery_timeout: Duration::from_secs(5),
            teardown_timeout: Duration::from_secs(5),
            ..Self::default()
        }
    }

    /// Set the keep-alive probe interval.
    #[must_use]
    pub fn probe_interval(mut self, interval: Duration) -> Self {
        self.probe_interval = interval;
        self
    }

    /// Set the keep-alive probe timeout.
    #[must_use]
    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Set the descriptor write timeout.
    #[must_use]
    pub fn descriptor_write_timeout(mut self, timeout: Duration) -> Self {
        self.descriptor_write_timeout = timeout;
        self
    }

    /// Set the discovery timeout.
    #[must_use]
    pub fn discovery_timeout(mut self, timeout: Duration) -> Self {
        self.discovery_timeout = timeout;
        self
    }

    /// Set the default teardown deadline.
    #[must_use]
    pub fn teardown_timeout(mut self, timeout: Duration) -> Self {
        self.teardown_timeout = timeout;
        self
    }

    /// Set the event channel capacity.
    #[must_use]
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Validate the config and return an error if invalid.
    ///
    /// Checks that:
    /// - every duration is > 0
    /// - `probe_timeout` does not exceed `probe_interval`
    /// - `event_capacity` is > 0
    pub fn validate(&self) -> Result<()> {
        let durations = [
            ("probe_interval", self.probe_interval),
            ("probe_timeout", self.probe_timeout),
            ("descriptor_write_timeout", self.descriptor_write_timeout),
            ("discovery_timeout", self.discovery_timeout),
            ("teardown_timeout", self.teardown_timeout),
        ];
        for (name, value) in durations {
            if value.is_zero() {
                return Err(Error::invalid_config(format!("{name} must be > 0")));
            }
        }
        if self.probe_timeout > self.probe_interval {
            return Err(Error::invalid_config(
                "probe_timeout must be <= probe_interval",
            ));
        }
        if self.event_capacity == 0 {
            return Err(Error::invalid_config("event_capacity must be > 0"));
        }
        Ok(())
    }

    /// Parse a config from TOML text. Missing keys take their default value.
    pub fn from_toml_str(content: &str) -> std::result::Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Load a config from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> std::result::Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Read {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        Self::from_toml_str(&content)
    }

    /// Load a config from a TOML file and validate it.
    pub fn load_validated<P: AsRef<Path>>(path: P) -> std::result::Result<Self, ConfigError> {
        let config = Self::load(path)?;
        config.validate().map_err(ConfigError::Invalid)?;
        Ok(config)
    }
}

/// Errors from loading a [`LinkConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("Failed to read config file {path}: {source}")]
    Read {
        /// The path that was read.
        path: PathBuf,
        /// The I/O failure.
        source: std::io::Error,
    },

    /// The TOML could not be parsed.
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// The values failed validation.
    #[error(transparent)]
    Invalid(Error),
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
