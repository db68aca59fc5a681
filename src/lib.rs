//! tun-firewall: TUN-based packet interception and filtering core
//!
//! This crate owns a virtual network interface, reads raw IP packets from
//! it, classifies each packet against an ordered rule set, forwards or drops
//! it, and maintains traffic counters for observers.
//!
//! # Architecture
//!
//! ```text
//! Tunnel Device -> Forwarding Loop -> Header Parser -> Rule Engine
//!       ^               |                                   |
//!       |          Stats counters <------ verdict ----------+
//!       +--------- write (Allow) / drop (Drop)
//! ```
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use tun_firewall::config::TunnelConfig;
//! use tun_firewall::rules::RuleEngine;
//! use tun_firewall::session::FirewallSession;
//! use tun_firewall::tun::MemoryTunnelProvider;
//!
//! let session = FirewallSession::new(
//!     TunnelConfig::default(),
//!     Arc::new(MemoryTunnelProvider::new()),
//!     Arc::new(RuleEngine::with_defaults()),
//! );
//!
//! session.start().unwrap();
//! let stats = session.stats_snapshot();
//! assert_eq!(stats.total_packets, 0);
//! session.stop();
//! ```
//!
//! # Modules
//!
//! - [`config`]: Configuration types and loading
//! - [`error`]: Error types
//! - [`packet`]: IPv4 header parsing
//! - [`rules`]: Rule types and the filtering engine
//! - [`session`]: Session lifecycle and the forwarding loop
//! - [`stats`]: Traffic counters and snapshots
//! - [`tun`]: Tunnel device abstraction and implementations

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_precision_loss)]

pub mod config;
pub mod error;
pub mod packet;
pub mod rules;
pub mod session;
pub mod stats;
pub mod tun;

// Re-export commonly used types at the crate root
pub use config::{Config, TunnelConfig};
pub use error::{ConfigError, FirewallError, PacketError, SessionError, TunnelError};
pub use packet::{Ipv4Header, Protocol};
pub use rules::{Action, Rule, RuleEngine, RuleMatch, RuleSet, Verdict};
pub use session::{FirewallSession, SessionState, SessionStatus};
pub use stats::{ProtocolBreakdown, SessionStats, StatsSnapshot};
pub use tun::{TunnelDevice, TunnelProvider};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
