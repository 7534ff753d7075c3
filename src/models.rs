use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced when validating a configuration update
#[derive(Error, Debug)]
pub enum ConfigValidationError {
    #[error("invalid field `{field}`: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
}

/// Detection engine thresholds and switches.
///
/// Read-mostly; replaced as a whole by `Engine::update_config`, never
/// mutated field by field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Whether high/critical findings block the request inline
    pub real_time_blocking: bool,
    /// Sliding-window request limit per IP per minute
    pub max_requests_per_minute: u32,
    /// Sliding-window request limit per IP per hour
    pub max_requests_per_hour: u32,
    /// Reputation scores below this are treated as malicious (0-100)
    pub reputation_threshold: u8,
    /// ISO 3166-1 alpha-2 country codes that are geo-restricted
    pub blocked_countries: Vec<String>,
    /// Whether geo-restricted findings also hard-block the request
    pub enforce_geo_blocking: bool,
    /// Duration of an automatic IP block, in minutes
    pub auto_block_minutes: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            real_time_blocking: true,
            max_requests_per_minute: 100,
            max_requests_per_hour: 1000,
            reputation_threshold: 30,
            blocked_countries: Vec::new(),
            enforce_geo_blocking: false,
            auto_block_minutes: 60,
        }
    }
}

/// Partial engine configuration supplied to `update_config`.
///
/// Absent fields keep their current value. The merged result is validated
/// before it replaces the active config; an invalid patch is rejected as a
/// whole.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfigPatch {
    pub real_time_blocking: Option<bool>,
    pub max_requests_per_minute: Option<u32>,
    pub max_requests_per_hour: Option<u32>,
    pub reputation_threshold: Option<u8>,
    pub blocked_countries: Option<Vec<String>>,
    pub enforce_geo_blocking: Option<bool>,
    pub auto_block_minutes: Option<i64>,
}

impl EngineConfig {
    /// Merge a patch into this config, returning the validated result.
    pub fn merged(&self, patch: &EngineConfigPatch) -> Result<Self, ConfigValidationError> {
        let merged = Self {
            real_time_blocking: patch.real_time_blocking.unwrap_or(self.real_time_blocking),
            max_requests_per_minute: patch
                .max_requests_per_minute
                .unwrap_or(self.max_requests_per_minute),
            max_requests_per_hour: patch
                .max_requests_per_hour
                .unwrap_or(self.max_requests_per_hour),
            reputation_threshold: patch.reputation_threshold.unwrap_or(self.reputation_threshold),
            blocked_countries: patch
                .blocked_countries
                .clone()
                .unwrap_or_else(|| self.blocked_countries.clone()),
            enforce_geo_blocking: patch.enforce_geo_blocking.unwrap_or(self.enforce_geo_blocking),
            auto_block_minutes: patch.auto_block_minutes.unwrap_or(self.auto_block_minutes),
        };
        merged.validate()?;
        Ok(merged)
    }

    /// Validate invariants on the thresholds
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.max_requests_per_minute == 0 {
            return Err(ConfigValidationError::InvalidField {
                field: "max_requests_per_minute",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.max_requests_per_hour < self.max_requests_per_minute {
            return Err(ConfigValidationError::InvalidField {
                field: "max_requests_per_hour",
                reason: "must be at least max_requests_per_minute".to_string(),
            });
        }
        if self.reputation_threshold > 100 {
            return Err(ConfigValidationError::InvalidField {
                field: "reputation_threshold",
                reason: "must be within 0-100".to_string(),
            });
        }
        if self.auto_block_minutes < 0 {
            return Err(ConfigValidationError::InvalidField {
                field: "auto_block_minutes",
                reason: "must not be negative".to_string(),
            });
        }
        for country in &self.blocked_countries {
            if country.len() != 2 || !country.chars().all(|c| c.is_ascii_alphabetic()) {
                return Err(ConfigValidationError::InvalidField {
                    field: "blocked_countries",
                    reason: format!("`{}` is not an ISO 3166-1 alpha-2 code", country),
                });
            }
        }
        Ok(())
    }
}

/// Reputation lookup configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReputationConfig {
    /// Reputation provider base URL; when absent the stub provider is used
    pub endpoint: Option<String>,
    /// Overall lookup timeout in milliseconds
    pub timeout_ms: u64,
    /// How long a cached record stays valid, in minutes
    pub cache_ttl_minutes: i64,
    /// Maximum number of cached records
    pub cache_capacity: usize,
}

impl Default for ReputationConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_ms: 300,
            cache_ttl_minutes: 30,
            cache_capacity: 10_000,
        }
    }
}

/// Outbound event sink configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Logging endpoint URL; when absent findings stay local
    pub endpoint: Option<String>,
    /// Request timeout for sink publishes, in milliseconds
    pub timeout_ms: u64,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_ms: 500,
        }
    }
}

/// Event store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventStoreConfig {
    /// Maximum retained findings; the oldest are evicted above this
    pub capacity: usize,
}

impl Default for EventStoreConfig {
    fn default() -> Self {
        Self { capacity: 10_000 }
    }
}

/// Housekeeping configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HousekeepingConfig {
    /// Sweep interval in seconds
    pub interval_seconds: u64,
}

impl Default for HousekeepingConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 300,
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// Detection engine configuration
    pub engine: EngineConfig,
    /// Reputation lookup configuration
    pub reputation: ReputationConfig,
    /// Event sink configuration
    pub sink: SinkConfig,
    /// Event store configuration
    pub events: EventStoreConfig,
    /// Housekeeping configuration
    pub housekeeping: HousekeepingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            engine: EngineConfig::default(),
            reputation: ReputationConfig::default(),
            sink: SinkConfig::default(),
            events: EventStoreConfig::default(),
            housekeeping: HousekeepingConfig::default(),
        }
    }
}
