//! Configuration loading and management
//!
//! This module handles loading configuration from files and environment
//! variables.

use std::path::Path;

use tracing::{debug, info};

use super::types::Config;
use crate::error::ConfigError;

/// Load configuration from a JSON file
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read or parsed.
pub fn load_config(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let path = path.as_ref();

    debug!("Loading configuration from {:?}", path);

    if !path.exists() {
        return Err(ConfigError::FileNotFound {
            path: path.display().to_string(),
        });
    }

    let contents = std::fs::read_to_string(path)?;

    let config: Config = serde_json::from_str(&contents)
        .map_err(|e| ConfigError::ParseError(format!("Failed to parse JSON: {e} at {path:?}")))?;

    config.validate()?;

    info!(
        "Configuration loaded: {} rules, default action {:?}",
        config.rules.rules.len(),
        config.rules.default_action
    );

    Ok(config)
}

/// Load configuration from a JSON string
///
/// # Errors
///
/// Returns `ConfigError` if parsing or validation fails.
pub fn load_config_str(json: &str) -> Result<Config, ConfigError> {
    let config: Config =
        serde_json::from_str(json).map_err(|e| ConfigError::ParseError(e.to_string()))?;

    config.validate()?;

    Ok(config)
}

/// Load configuration with environment variable overrides
///
/// Environment variables:
/// - `TUN_FIREWALL_TUN_NAME`: Override the interface name
/// - `TUN_FIREWALL_ADDRESS`: Override the virtual interface address
/// - `TUN_FIREWALL_LOG_LEVEL`: Override log level
///
/// # Errors
///
/// Returns `ConfigError` if loading or parsing fails.
pub fn load_config_with_env(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let mut config = load_config(path)?;

    if let Ok(name) = std::env::var("TUN_FIREWALL_TUN_NAME") {
        config.tunnel.name = Some(name);
        debug!("Interface name overridden to {:?}", config.tunnel.name);
    }

    if let Ok(addr) = std::env::var("TUN_FIREWALL_ADDRESS") {
        config.tunnel.address = addr.parse().map_err(|_| ConfigError::EnvError {
            name: "TUN_FIREWALL_ADDRESS".into(),
            reason: format!("Invalid IPv4 address: {addr}"),
        })?;
        debug!("Interface address overridden to {}", config.tunnel.address);
    }

    if let Ok(level) = std::env::var("TUN_FIREWALL_LOG_LEVEL") {
        config.log.level = level;
        debug!("Log level overridden to {}", config.log.level);
    }

    // Re-validate after overrides
    config.validate()?;

    Ok(config)
}

/// Write the default configuration to a file
///
/// # Errors
///
/// Returns `ConfigError` if serialization or the write fails.
pub fn create_default_config(path: impl AsRef<Path>) -> Result<(), ConfigError> {
    let config = Config::default_config();
    let json = serde_json::to_string_pretty(&config)
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;
    std::fs::write(path.as_ref(), json)?;
    info!("Default configuration written to {:?}", path.as_ref());
    Ok(())
}
