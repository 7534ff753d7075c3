//! Configuration management for the threat detection service.
//!
//! This module handles loading and managing application configuration
//! from environment variables and configuration files.

use crate::models::Config;
use ::config::{Config as ConfigBuilder, ConfigError, Environment, File};
use std::env;

/// Load configuration from the config file and environment variables
pub fn load_config() -> Result<Config, ConfigError> {
    let config_file = env::var("CONFIG_FILE").unwrap_or_else(|_| "config/default.toml".to_string());

    let config = ConfigBuilder::builder()
        .add_source(File::with_name(&config_file).required(false))
        .add_source(Environment::default().separator("__"))
        .set_default("server.host", "127.0.0.1")?
        .set_default("server.port", 8080)?
        .set_default("engine.real_time_blocking", true)?
        .set_default("engine.max_requests_per_minute", 100)?
        .set_default("engine.max_requests_per_hour", 1000)?
        .set_default("engine.reputation_threshold", 30)?
        .set_default("engine.blocked_countries", Vec::<String>::new())?
        .set_default("engine.enforce_geo_blocking", false)?
        .set_default("engine.auto_block_minutes", 60)?
        .set_default("reputation.timeout_ms", 300)?
        .set_default("reputation.cache_ttl_minutes", 30)?
        .set_default("reputation.cache_capacity", 10_000)?
        .set_default("sink.timeout_ms", 500)?
        .set_default("events.capacity", 10_000)?
        .set_default("housekeeping.interval_seconds", 300)?
        .build()?;

    config.try_deserialize()
}
