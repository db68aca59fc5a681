//! Configuration module for tun-firewall
//!
//! This module provides configuration types and loading utilities.
//!
//! # Example
//!
//! ```no_run
//! use tun_firewall::config::{load_config, Config};
//!
//! let config = load_config("/etc/tun-firewall/config.json").unwrap();
//! println!("Interface address: {}", config.tunnel.address);
//! ```

mod loader;
mod types;

pub use loader::{create_default_config, load_config, load_config_str, load_config_with_env};
pub use types::{Config, LogConfig, RulesConfig, TunnelConfig};
