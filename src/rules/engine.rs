//! Packet-filtering rule engine with lock-free evaluation.
//!
//! The engine maintains an immutable [`RuleSet`] behind an `ArcSwap` so the
//! forwarding loop can evaluate packets without taking a lock, while
//! administrative operations (`add_rule`, `remove_rule`, `clear_rules`) swap
//! in a new set atomically.
//!
//! ```text
//! Forwarding loop -> RuleEngine::evaluate() -> ArcSwap::load() -> RuleSet
//!                                                   |
//!                                            (lock-free read)
//!
//! Admin op -> RuleEngine::add_rule() -> ArcSwap::rcu() -> old set dropped
//!                                             |             when readers finish
//!                                       (atomic swap)
//! ```
//!
//! # Example
//!
//! ```
//! use tun_firewall::rules::{RuleEngine, RuleSet, Verdict};
//! use tun_firewall::packet::Ipv4Header;
//!
//! let engine = RuleEngine::new(RuleSet::shipped_default());
//!
//! let mut buf = [0u8; 20];
//! buf[0] = 0x45;
//! buf[16..20].copy_from_slice(&[198, 51, 100, 1]);
//! let header = Ipv4Header::parse(&buf).unwrap();
//!
//! assert_eq!(engine.evaluate(&header), Verdict::Drop);
//! ```

use std::sync::Arc;

use arc_swap::ArcSwap;

use super::{Rule, RuleSet, Verdict};
use crate::packet::Ipv4Header;

/// Hot-swappable packet-filtering engine.
///
/// # Thread Safety
///
/// The engine is safe to share across threads. Evaluation is lock-free and
/// never blocks administrative updates; updates are atomic swaps. No caller
/// can hold a lock that blocks the forwarding worker.
pub struct RuleEngine {
    /// Current rule set (lock-free reads via `ArcSwap`).
    rules: ArcSwap<RuleSet>,
}

impl RuleEngine {
    /// Create an engine with an initial rule set
    #[must_use]
    pub fn new(rules: RuleSet) -> Self {
        Self {
            rules: ArcSwap::from_pointee(rules),
        }
    }

    /// Create an engine with the shipped default configuration
    /// (one rule: destination 198.51.100.1 is dropped)
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(RuleSet::shipped_default())
    }

    /// Evaluate one parsed header against the current rule set
    ///
    /// Pure function of engine state and header: rules are checked in
    /// insertion order, the first enabled match determines the verdict, and
    /// the default action (Allow unless configured otherwise) applies when
    /// nothing matches. No I/O, no allocation on the hot path.
    #[must_use]
    pub fn evaluate(&self, header: &Ipv4Header) -> Verdict {
        self.rules.load().evaluate(header)
    }

    /// Current rule set snapshot
    #[must_use]
    pub fn rules(&self) -> Arc<RuleSet> {
        self.rules.load_full()
    }

    /// Number of rules in the current set
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.load().len()
    }

    /// Whether the current set holds no rules
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.load().is_empty()
    }

    /// Append a rule to the end of the evaluation order
    ///
    /// Administrative operation with no packet-processing side effects;
    /// in-flight evaluations finish against the previous set.
    pub fn add_rule(&self, rule: Rule) {
        self.rules.rcu(|current| {
            let mut rules = current.rules().to_vec();
            rules.push(rule.clone());
            RuleSet::new(rules, current.default_action())
        });
    }

    /// Remove the rule with the given id
    ///
    /// Returns `true` if a rule was removed.
    pub fn remove_rule(&self, id: u64) -> bool {
        let mut removed = false;
        self.rules.rcu(|current| {
            let rules: Vec<Rule> = current
                .rules()
                .iter()
                .filter(|r| r.id != id)
                .cloned()
                .collect();
            removed = rules.len() != current.len();
            RuleSet::new(rules, current.default_action())
        });
        removed
    }

    /// Remove all rules, leaving only the default action
    pub fn clear_rules(&self) {
        self.rules
            .rcu(|current| RuleSet::new(Vec::new(), current.default_action()));
    }

    /// Replace the entire rule set atomically
    pub fn replace(&self, rules: RuleSet) {
        self.rules.store(Arc::new(rules));
    }
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self::with_defaults()
    }
}
