//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::ServerConfig;

/// Errors raised while loading a configuration file. All are fatal at
/// startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Validation(String),
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ServerConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config: ServerConfig = toml::from_str(&content)?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &ServerConfig) -> Result<(), ConfigError> {
    if config.pool.core_size == 0 {
        return Err(ConfigError::Validation(
            "pool.core_size must be at least 1".to_string(),
        ));
    }
    if config.pool.max_size < config.pool.core_size {
        return Err(ConfigError::Validation(format!(
            "pool.max_size ({}) must be >= pool.core_size ({})",
            config.pool.max_size, config.pool.core_size
        )));
    }
    if config.pool.queue_capacity == 0 {
        return Err(ConfigError::Validation(
            "pool.queue_capacity must be at least 1".to_string(),
        ));
    }
    if config.reactor.worker_threads == 0 {
        return Err(ConfigError::Validation(
            "reactor.worker_threads must be at least 1".to_string(),
        ));
    }
    Ok(())
}
