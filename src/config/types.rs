//! Configuration types for tun-firewall
//!
//! This module defines all configuration structures used by the firewall.
//! Configuration is loaded from JSON files and validated at startup.

use std::collections::HashSet;
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::rules::{Action, Rule, RuleSet};

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Virtual interface configuration
    #[serde(default)]
    pub tunnel: TunnelConfig,

    /// Filtering rules configuration
    #[serde(default)]
    pub rules: RulesConfig,

    /// Logging configuration
    #[serde(default)]
    pub log: LogConfig,
}

impl Config {
    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if validation fails.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.tunnel.validate()?;
        self.rules.validate()?;
        Ok(())
    }

    /// The default configuration: 10.0.0.2/24, default route, one rule
    /// dropping traffic to 198.51.100.1
    #[must_use]
    pub fn default_config() -> Self {
        Self {
            tunnel: TunnelConfig::default(),
            rules: RulesConfig::shipped_default(),
            log: LogConfig::default(),
        }
    }
}

/// Virtual interface configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TunnelConfig {
    /// Interface name; the kernel assigns one when absent
    #[serde(default)]
    pub name: Option<String>,

    /// Virtual interface address
    #[serde(default = "default_address")]
    pub address: Ipv4Addr,

    /// Address prefix length
    #[serde(default = "default_prefix_len")]
    pub prefix_len: u8,

    /// Route all traffic (0.0.0.0/0) through the interface
    #[serde(default = "default_true")]
    pub default_route: bool,

    /// Interface MTU
    #[serde(default = "default_mtu")]
    pub mtu: u16,
}

impl TunnelConfig {
    /// Validate the tunnel configuration
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` on an invalid prefix or MTU.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.prefix_len > 32 {
            return Err(ConfigError::ValidationError(format!(
                "Invalid prefix length: {}",
                self.prefix_len
            )));
        }
        if self.mtu == 0 {
            return Err(ConfigError::ValidationError("MTU must be non-zero".into()));
        }
        Ok(())
    }
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            name: None,
            address: default_address(),
            prefix_len: default_prefix_len(),
            default_route: true,
            mtu: default_mtu(),
        }
    }
}

/// Filtering rules configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RulesConfig {
    /// Rules in evaluation order
    #[serde(default)]
    pub rules: Vec<Rule>,

    /// Action when no rule matches
    #[serde(default = "default_action")]
    pub default_action: Action,
}

impl RulesConfig {
    /// The shipped rule set: drop traffic to 198.51.100.1, allow the rest
    #[must_use]
    pub fn shipped_default() -> Self {
        Self {
            rules: vec![Rule::default_block_rule()],
            default_action: Action::Allow,
        }
    }

    /// Validate rule definitions
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidRule` on duplicate rule ids.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut ids: HashSet<u64> = HashSet::new();
        for rule in &self.rules {
            if !ids.insert(rule.id) {
                return Err(ConfigError::InvalidRule(format!(
                    "Duplicate rule id: {}",
                    rule.id
                )));
            }
        }
        Ok(())
    }

    /// Build the immutable rule set for the engine
    #[must_use]
    pub fn to_rule_set(&self) -> RuleSet {
        RuleSet::new(self.rules.clone(), self.default_action)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format: "text" or "json"
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Include the event target in output
    #[serde(default)]
    pub target: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            target: false,
        }
    }
}

fn default_address() -> Ipv4Addr {
    Ipv4Addr::new(10, 0, 0, 2)
}

const fn default_prefix_len() -> u8 {
    24
}

const fn default_mtu() -> u16 {
    1500
}

const fn default_true() -> bool {
    true
}

const fn default_action() -> Action {
    Action::Allow
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "text".into()
}
