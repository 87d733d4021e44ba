//! Service configuration.
//!
//! Parsed from a TOML file into [`ServiceConfig`]. Every section has
//! defaults; validation is fail-closed: a configuration that cannot
//! drive the fetch pipeline (empty endpoint URLs, zero budget floor) is
//! rejected at load time rather than at the first refresh.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// The TOML could not be parsed.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A field value is not usable.
    #[error("invalid config for field {field}: {reason}")]
    Invalid {
        /// The offending field.
        field: &'static str,
        /// Why it is invalid.
        reason: String,
    },
}

/// Outbound fetch configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Topology endpoint (`{subnets: [...]}`-shaped JSON).
    pub topology_url: String,
    /// Hardware endpoint (`{nodes: [...]}`-shaped JSON).
    pub hardware_url: String,
    /// Declared resource budget available for outbound calls.
    pub available_budget: u64,
    /// Per-call budget floor; a call is declined below this.
    pub budget_floor: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            topology_url: String::new(),
            hardware_url: String::new(),
            available_budget: 1_000_000,
            budget_floor: 10_000,
        }
    }
}

/// Refresh rate-limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    /// Cooldown between successful refreshes, in seconds.
    pub cooldown_secs: u64,
    /// Data older than this is reported stale, in seconds.
    pub staleness_threshold_secs: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: 1_800,
            staleness_threshold_secs: 7_200,
        }
    }
}

/// Store and aggregation policy configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Policy for node ids missing from the hardware dataset.
    pub generation_fallback: crate::generation::GenerationFallback,
    /// Subnet ids treated as sentinel buckets, excluded from real-subnet
    /// statistics.
    pub sentinel_subnets: Vec<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            generation_fallback: crate::generation::GenerationFallback::default(),
            sentinel_subnets: vec!["unassigned".to_string()],
        }
    }
}

/// Daemon surface configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Listen address for the HTTP query surface.
    pub listen_addr: String,
    /// Path of the persisted state file.
    pub state_file: PathBuf,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:9470".to_string(),
            state_file: PathBuf::from("netatlas-state.json"),
        }
    }
}

/// Top-level service configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// Outbound fetch settings.
    pub fetch: FetchConfig,
    /// Refresh rate limiting.
    pub refresh: RefreshConfig,
    /// Store policies.
    pub store: StoreConfig,
    /// Daemon surface.
    pub daemon: DaemonConfig,
}

impl ServiceConfig {
    /// Loads and validates configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or the content fails
    /// [`ServiceConfig::from_toml`].
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parses and validates configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when:
    /// - either endpoint URL is empty
    /// - the budget floor is zero or exceeds the available budget
    /// - the cooldown is zero
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.fetch.topology_url.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "fetch.topology_url",
                reason: "must not be empty".to_string(),
            });
        }
        if self.fetch.hardware_url.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "fetch.hardware_url",
                reason: "must not be empty".to_string(),
            });
        }
        if self.fetch.budget_floor == 0 {
            return Err(ConfigError::Invalid {
                field: "fetch.budget_floor",
                reason: "must be positive".to_string(),
            });
        }
        if self.fetch.budget_floor > self.fetch.available_budget {
            return Err(ConfigError::Invalid {
                field: "fetch.available_budget",
                reason: format!(
                    "available budget {} is below the per-call floor {}",
                    self.fetch.available_budget, self.fetch.budget_floor
                ),
            });
        }
        if self.refresh.cooldown_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "refresh.cooldown_secs",
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }
}
