//! Core rule types for the filtering engine
//!
//! This module defines the fundamental types for filtering rules:
//! - [`Action`]: what to do with a matching packet
//! - [`Verdict`]: the per-packet outcome of evaluation
//! - [`RuleMatch`]: the predicate a rule applies to a parsed header
//! - [`Rule`]: an ordered predicate-action pair
//! - [`RuleSet`]: an immutable ordered rule collection with a default action

use std::fmt;
use std::net::Ipv4Addr;

use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};

use crate::packet::{Ipv4Header, Protocol};

/// Action attached to a rule
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    /// Forward the packet unmodified
    #[default]
    #[serde(rename = "allow")]
    Allow,

    /// Discard the packet; its bytes never reach the device output side
    #[serde(rename = "drop")]
    Drop,
}

/// The unique outcome of evaluating one header against the engine
///
/// Exactly one verdict is produced per packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Forward the packet
    Allow,
    /// Discard the packet
    Drop,
}

impl From<Action> for Verdict {
    fn from(action: Action) -> Self {
        match action {
            Action::Allow => Self::Allow,
            Action::Drop => Self::Drop,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allow => write!(f, "allow"),
            Self::Drop => write!(f, "drop"),
        }
    }
}

/// Predicate a rule applies to a parsed header
///
/// New predicate kinds (ports, once header parsing is extended) are added
/// here without changing the evaluation contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "match", content = "target")]
pub enum RuleMatch {
    /// Exact destination address match
    #[serde(rename = "dest_ip")]
    DestIp(Ipv4Addr),

    /// Exact source address match
    #[serde(rename = "source_ip")]
    SourceIp(Ipv4Addr),

    /// Destination address within a CIDR network
    #[serde(rename = "dest_net")]
    DestNet(Ipv4Net),

    /// Source address within a CIDR network
    #[serde(rename = "source_net")]
    SourceNet(Ipv4Net),

    /// IP protocol number match
    #[serde(rename = "protocol")]
    Protocol(u8),

    /// Matches every packet; useful as a terminal catch-all
    #[serde(rename = "any")]
    Any,
}

impl RuleMatch {
    /// Check whether this predicate matches the given header
    #[must_use]
    pub fn matches(&self, header: &Ipv4Header) -> bool {
        match self {
            Self::DestIp(ip) => header.destination == *ip,
            Self::SourceIp(ip) => header.source == *ip,
            Self::DestNet(net) => net.contains(&header.destination),
            Self::SourceNet(net) => net.contains(&header.source),
            Self::Protocol(n) => header.protocol == Protocol::from_number(*n),
            Self::Any => true,
        }
    }
}

/// A single filtering rule
///
/// Rules form an ordered sequence; evaluation stops at the first rule whose
/// predicate matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    /// Unique identifier for this rule
    pub id: u64,

    /// Predicate applied to the parsed header
    #[serde(flatten)]
    pub matcher: RuleMatch,

    /// Action taken when the predicate matches
    pub action: Action,

    /// Whether this rule participates in evaluation
    #[serde(default = "default_true")]
    pub enabled: bool,
}

const fn default_true() -> bool {
    true
}

impl Rule {
    /// Create a new enabled rule
    ///
    /// # Examples
    ///
    /// ```
    /// use tun_firewall::rules::{Action, Rule, RuleMatch};
    ///
    /// let rule = Rule::new(1, RuleMatch::DestIp("198.51.100.1".parse().unwrap()), Action::Drop);
    /// assert!(rule.enabled);
    /// ```
    #[must_use]
    pub const fn new(id: u64, matcher: RuleMatch, action: Action) -> Self {
        Self {
            id,
            matcher,
            action,
            enabled: true,
        }
    }

    /// Set the enabled state for this rule
    #[must_use]
    pub const fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// The shipped default rule: drop all traffic to 198.51.100.1
    #[must_use]
    pub const fn default_block_rule() -> Self {
        Self::new(
            1,
            RuleMatch::DestIp(Ipv4Addr::new(198, 51, 100, 1)),
            Action::Drop,
        )
    }
}

/// Immutable ordered rule collection with a default action
///
/// Built once and swapped atomically into the engine; evaluation never
/// mutates it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleSet {
    rules: Vec<Rule>,
    default_action: Action,
}

impl RuleSet {
    /// Create a rule set with the given rules and default action
    #[must_use]
    pub const fn new(rules: Vec<Rule>, default_action: Action) -> Self {
        Self {
            rules,
            default_action,
        }
    }

    /// An empty rule set whose default action is Allow
    #[must_use]
    pub const fn empty() -> Self {
        Self::new(Vec::new(), Action::Allow)
    }

    /// The shipped default configuration: one drop rule, default Allow
    #[must_use]
    pub fn shipped_default() -> Self {
        Self::new(vec![Rule::default_block_rule()], Action::Allow)
    }

    /// Rules in insertion order
    #[must_use]
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Default action when no rule matches
    #[must_use]
    pub const fn default_action(&self) -> Action {
        self.default_action
    }

    /// Number of rules (including disabled ones)
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the set holds no rules
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Evaluate a header against the set: first enabled match wins
    #[must_use]
    pub fn evaluate(&self, header: &Ipv4Header) -> Verdict {
        for rule in &self.rules {
            if rule.enabled && rule.matcher.matches(header) {
                return rule.action.into();
            }
        }
        self.default_action.into()
    }
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::MIN_HEADER_LEN;

    fn header(protocol: u8, src: [u8; 4], dst: [u8; 4]) -> Ipv4Header {
        let mut buf = [0u8; MIN_HEADER_LEN];
        buf[0] = 0x45;
        buf[9] = protocol;
        buf[12..16].copy_from_slice(&src);
        buf[16..20].copy_from_slice(&dst);
        Ipv4Header::parse(&buf).unwrap()
    }

    #[test]
    fn test_match_dest_ip() {
        let m = RuleMatch::DestIp(Ipv4Addr::new(198, 51, 100, 1));
        assert!(m.matches(&header(6, [10, 0, 0, 2], [198, 51, 100, 1])));
        assert!(!m.matches(&header(6, [10, 0, 0, 2], [8, 8, 8, 8])));
    }

    #[test]
    fn test_match_source_ip() {
        let m = RuleMatch::SourceIp(Ipv4Addr::new(10, 0, 0, 2));
        assert!(m.matches(&header(6, [10, 0, 0, 2], [8, 8, 8, 8])));
        assert!(!m.matches(&header(6, [10, 0, 0, 3], [8, 8, 8, 8])));
    }

    #[test]
    fn test_match_cidr() {
        let net: Ipv4Net = "198.51.100.0/24".parse().unwrap();
        let m = RuleMatch::DestNet(net);
        assert!(m.matches(&header(6, [0; 4], [198, 51, 100, 200])));
        assert!(!m.matches(&header(6, [0; 4], [198, 51, 101, 1])));
    }

    #[test]
    fn test_match_protocol_and_any() {
        assert!(RuleMatch::Protocol(17).matches(&header(17, [0; 4], [0; 4])));
        assert!(!RuleMatch::Protocol(17).matches(&header(6, [0; 4], [0; 4])));
        assert!(RuleMatch::Any.matches(&header(0, [0; 4], [0; 4])));
    }

    #[test]
    fn test_first_match_wins() {
        let set = RuleSet::new(
            vec![
                Rule::new(1, RuleMatch::Protocol(6), Action::Allow),
                Rule::new(2, RuleMatch::Any, Action::Drop),
            ],
            Action::Allow,
        );

        // TCP hits the first rule even though the catch-all would drop it
        assert_eq!(set.evaluate(&header(6, [0; 4], [8, 8, 8, 8])), Verdict::Allow);
        assert_eq!(set.evaluate(&header(17, [0; 4], [8, 8, 8, 8])), Verdict::Drop);
    }

    #[test]
    fn test_disabled_rules_are_skipped() {
        let set = RuleSet::new(
            vec![Rule::default_block_rule().with_enabled(false)],
            Action::Allow,
        );
        assert_eq!(
            set.evaluate(&header(6, [0; 4], [198, 51, 100, 1])),
            Verdict::Allow
        );
    }

    #[test]
    fn test_empty_set_defaults_to_allow() {
        let set = RuleSet::empty();
        assert_eq!(set.evaluate(&header(6, [0; 4], [1, 2, 3, 4])), Verdict::Allow);
    }

    #[test]
    fn test_shipped_default() {
        let set = RuleSet::shipped_default();
        assert_eq!(set.len(), 1);
        assert_eq!(
            set.evaluate(&header(6, [10, 0, 0, 2], [198, 51, 100, 1])),
            Verdict::Drop
        );
        assert_eq!(
            set.evaluate(&header(6, [10, 0, 0, 2], [8, 8, 8, 8])),
            Verdict::Allow
        );
    }

    #[test]
    fn test_rule_serde_roundtrip() {
        let rule = Rule::default_block_rule();
        let json = serde_json::to_string(&rule).unwrap();
        assert!(json.contains("dest_ip"));
        assert!(json.contains("198.51.100.1"));

        let back: Rule = serde_json::from_str(&json).unwrap();
        assert_eq!(back, rule);
    }
}
