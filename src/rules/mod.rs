//! Rule engine module for packet verdicts
//!
//! This module provides:
//! - Rule and predicate type definitions
//! - An ordered, first-match rule set with a configurable default action
//! - A hot-swappable engine with lock-free evaluation
//!
//! # Architecture
//!
//! Rules are evaluated in insertion order. The first enabled rule whose
//! predicate matches the parsed header determines the [`Verdict`]; absence of
//! any match yields the default action (Allow in the shipped configuration).
//!
//! # Example
//!
//! ```
//! use tun_firewall::rules::{Action, Rule, RuleEngine, RuleMatch, RuleSet};
//!
//! let set = RuleSet::new(
//!     vec![
//!         Rule::new(1, RuleMatch::DestIp("198.51.100.1".parse().unwrap()), Action::Drop),
//!         Rule::new(2, RuleMatch::Protocol(1), Action::Drop),
//!     ],
//!     Action::Allow,
//! );
//! let engine = RuleEngine::new(set);
//! assert_eq!(engine.len(), 2);
//! ```

pub mod engine;
mod types;

pub use engine::RuleEngine;
pub use types::{Action, Rule, RuleMatch, RuleSet, Verdict};
