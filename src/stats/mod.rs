//! Session traffic statistics
//!
//! This module provides the counters mutated by the forwarding loop and the
//! immutable snapshot read by observers. The worker is the only writer;
//! counters are atomics so any number of readers can snapshot them without
//! holding a lock that could block the worker.
//!
//! Counters are monotonically non-decreasing for the lifetime of one running
//! session and reset to zero only when a new session starts.

pub mod simulated;

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::packet::Protocol;

/// Atomic per-session counters, written only by the forwarding loop
#[derive(Debug)]
pub struct SessionStats {
    /// Packets read from the tunnel device
    total_packets: AtomicU64,
    /// Packets that reached the parse stage (well-formed or not)
    packets_analyzed: AtomicU64,
    /// Packets discarded by a rule verdict
    packets_dropped: AtomicU64,
    /// Threats blocked; in lockstep with `packets_dropped` under the default rule set
    threats_blocked: AtomicU64,
    /// Packets received from the device input side (equals `total_packets`)
    packets_received: AtomicU64,
    /// Packets written to the device output side
    packets_sent: AtomicU64,
    /// Sum of lengths of all packets read, regardless of verdict
    bytes_processed: AtomicU64,
    /// TCP packets seen
    tcp: AtomicU64,
    /// UDP packets seen
    udp: AtomicU64,
    /// ICMP packets seen
    icmp: AtomicU64,
    /// Packets of any other protocol
    other: AtomicU64,
    /// Start of the current session; basis for derived uptime
    start_time: Mutex<Instant>,
}

impl SessionStats {
    /// Create zeroed statistics with the start time set to now
    #[must_use]
    pub fn new() -> Self {
        Self {
            total_packets: AtomicU64::new(0),
            packets_analyzed: AtomicU64::new(0),
            packets_dropped: AtomicU64::new(0),
            threats_blocked: AtomicU64::new(0),
            packets_received: AtomicU64::new(0),
            packets_sent: AtomicU64::new(0),
            bytes_processed: AtomicU64::new(0),
            tcp: AtomicU64::new(0),
            udp: AtomicU64::new(0),
            icmp: AtomicU64::new(0),
            other: AtomicU64::new(0),
            start_time: Mutex::new(Instant::now()),
        }
    }

    /// Record one packet read of `len` bytes from the device
    pub fn record_received(&self, len: u64) {
        self.total_packets.fetch_add(1, Ordering::Relaxed);
        self.packets_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_processed.fetch_add(len, Ordering::Relaxed);
    }

    /// Record a packet too short to parse; it is dropped without evaluation
    pub fn record_malformed(&self) {
        self.packets_analyzed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a successfully parsed packet and its protocol bucket
    pub fn record_analyzed(&self, protocol: Protocol) {
        self.packets_analyzed.fetch_add(1, Ordering::Relaxed);
        let bucket = match protocol {
            Protocol::Tcp => &self.tcp,
            Protocol::Udp => &self.udp,
            Protocol::Icmp => &self.icmp,
            Protocol::Other(_) => &self.other,
        };
        bucket.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a Drop verdict
    pub fn record_dropped(&self) {
        self.packets_dropped.fetch_add(1, Ordering::Relaxed);
        self.threats_blocked.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a packet forwarded to the device output side
    pub fn record_sent(&self) {
        self.packets_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Get total packets read
    #[must_use]
    pub fn total_packets(&self) -> u64 {
        self.total_packets.load(Ordering::Relaxed)
    }

    /// Get packets analyzed
    #[must_use]
    pub fn packets_analyzed(&self) -> u64 {
        self.packets_analyzed.load(Ordering::Relaxed)
    }

    /// Get packets dropped by verdict
    #[must_use]
    pub fn packets_dropped(&self) -> u64 {
        self.packets_dropped.load(Ordering::Relaxed)
    }

    /// Get threats blocked
    #[must_use]
    pub fn threats_blocked(&self) -> u64 {
        self.threats_blocked.load(Ordering::Relaxed)
    }

    /// Get packets forwarded to the output side
    #[must_use]
    pub fn packets_sent(&self) -> u64 {
        self.packets_sent.load(Ordering::Relaxed)
    }

    /// Get bytes processed
    #[must_use]
    pub fn bytes_processed(&self) -> u64 {
        self.bytes_processed.load(Ordering::Relaxed)
    }

    /// Get a consistent point-in-time copy of all counters
    ///
    /// Uptime is derived from the session start time, not stored
    /// incrementally.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            total_packets: self.total_packets.load(Ordering::Relaxed),
            packets_analyzed: self.packets_analyzed.load(Ordering::Relaxed),
            packets_dropped: self.packets_dropped.load(Ordering::Relaxed),
            threats_blocked: self.threats_blocked.load(Ordering::Relaxed),
            packets_received: self.packets_received.load(Ordering::Relaxed),
            packets_sent: self.packets_sent.load(Ordering::Relaxed),
            bytes_processed: self.bytes_processed.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.lock().elapsed().as_secs(),
            protocol_breakdown: ProtocolBreakdown {
                tcp: self.tcp.load(Ordering::Relaxed),
                udp: self.udp.load(Ordering::Relaxed),
                icmp: self.icmp.load(Ordering::Relaxed),
                other: self.other.load(Ordering::Relaxed),
            },
        }
    }

    /// Reset all counters to zero and restart the uptime clock
    ///
    /// Called by the session when a new run starts.
    pub fn reset(&self) {
        self.total_packets.store(0, Ordering::Relaxed);
        self.packets_analyzed.store(0, Ordering::Relaxed);
        self.packets_dropped.store(0, Ordering::Relaxed);
        self.threats_blocked.store(0, Ordering::Relaxed);
        self.packets_received.store(0, Ordering::Relaxed);
        self.packets_sent.store(0, Ordering::Relaxed);
        self.bytes_processed.store(0, Ordering::Relaxed);
        self.tcp.store(0, Ordering::Relaxed);
        self.udp.store(0, Ordering::Relaxed);
        self.icmp.store(0, Ordering::Relaxed);
        self.other.store(0, Ordering::Relaxed);
        *self.start_time.lock() = Instant::now();
    }
}

impl Default for SessionStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Immutable statistics snapshot exposed to observers
///
/// All counters are unsigned 64-bit; `protocol_breakdown` is a nested record
/// of the same counter type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Packets read from the tunnel device
    pub total_packets: u64,
    /// Packets that reached the parse stage
    pub packets_analyzed: u64,
    /// Packets discarded by a rule verdict
    pub packets_dropped: u64,
    /// Threats blocked
    pub threats_blocked: u64,
    /// Packets received from the device input side
    pub packets_received: u64,
    /// Packets written to the device output side
    pub packets_sent: u64,
    /// Sum of lengths of all processed packets
    pub bytes_processed: u64,
    /// Seconds since the session started
    pub uptime_seconds: u64,
    /// Per-protocol packet counters
    pub protocol_breakdown: ProtocolBreakdown,
}

impl StatsSnapshot {
    /// Dropped packets as a percentage of total, 0 when no traffic yet
    #[must_use]
    pub fn drop_rate(&self) -> f64 {
        if self.total_packets == 0 {
            0.0
        } else {
            (self.packets_dropped as f64 / self.total_packets as f64) * 100.0
        }
    }

    /// Uptime formatted as HH:MM:SS
    #[must_use]
    pub fn uptime_formatted(&self) -> String {
        let hours = self.uptime_seconds / 3600;
        let minutes = (self.uptime_seconds % 3600) / 60;
        let seconds = self.uptime_seconds % 60;
        format!("{hours:02}:{minutes:02}:{seconds:02}")
    }

    /// Bytes processed formatted with a binary unit suffix
    #[must_use]
    pub fn bytes_formatted(&self) -> String {
        const KB: u64 = 1024;
        const MB: u64 = 1024 * KB;
        const GB: u64 = 1024 * MB;
        let b = self.bytes_processed;
        match b {
            _ if b < KB => format!("{b} B"),
            _ if b < MB => format!("{} KB", b / KB),
            _ if b < GB => format!("{} MB", b / MB),
            _ => format!("{} GB", b / GB),
        }
    }
}

/// Per-IP-protocol packet counters (TCP/UDP/ICMP/other)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolBreakdown {
    /// TCP packets
    pub tcp: u64,
    /// UDP packets
    pub udp: u64,
    /// ICMP packets
    pub icmp: u64,
    /// Packets of any other protocol
    pub other: u64,
}

impl ProtocolBreakdown {
    /// Total packets across all buckets
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.tcp + self.udp + self.icmp + self.other
    }

    /// TCP share as a percentage of total, 0 when total is 0
    #[must_use]
    pub fn tcp_share(&self) -> f64 {
        Self::share(self.tcp, self.total())
    }

    /// UDP share as a percentage of total, 0 when total is 0
    #[must_use]
    pub fn udp_share(&self) -> f64 {
        Self::share(self.udp, self.total())
    }

    /// ICMP share as a percentage of total, 0 when total is 0
    #[must_use]
    pub fn icmp_share(&self) -> f64 {
        Self::share(self.icmp, self.total())
    }

    /// Other-protocol share as a percentage of total, 0 when total is 0
    #[must_use]
    pub fn other_share(&self) -> f64 {
        Self::share(self.other, self.total())
    }

    fn share(x: u64, total: u64) -> f64 {
        if total == 0 {
            0.0
        } else {
            (x as f64 / total as f64) * 100.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_snapshot() {
        let stats = SessionStats::new();

        stats.record_received(40);
        stats.record_analyzed(Protocol::Tcp);
        stats.record_dropped();

        stats.record_received(60);
        stats.record_analyzed(Protocol::Udp);
        stats.record_sent();

        let snap = stats.snapshot();
        assert_eq!(snap.total_packets, 2);
        assert_eq!(snap.packets_received, 2);
        assert_eq!(snap.packets_analyzed, 2);
        assert_eq!(snap.packets_dropped, 1);
        assert_eq!(snap.threats_blocked, 1);
        assert_eq!(snap.packets_sent, 1);
        assert_eq!(snap.bytes_processed, 100);
        assert_eq!(snap.protocol_breakdown.tcp, 1);
        assert_eq!(snap.protocol_breakdown.udp, 1);
    }

    #[test]
    fn test_bytes_counted_regardless_of_verdict() {
        let stats = SessionStats::new();
        let lengths = [40u64, 60, 20, 1500];
        for len in lengths {
            stats.record_received(len);
        }
        assert_eq!(stats.bytes_processed(), lengths.iter().sum::<u64>());
    }

    #[test]
    fn test_malformed_counts_analyzed_only() {
        let stats = SessionStats::new();
        stats.record_received(10);
        stats.record_malformed();

        let snap = stats.snapshot();
        assert_eq!(snap.packets_analyzed, 1);
        assert_eq!(snap.packets_dropped, 0);
        assert_eq!(snap.protocol_breakdown.total(), 0);
    }

    #[test]
    fn test_threats_in_lockstep_with_drops() {
        let stats = SessionStats::new();
        for _ in 0..5 {
            stats.record_dropped();
        }
        assert_eq!(stats.packets_dropped(), stats.threats_blocked());
    }

    #[test]
    fn test_reset() {
        let stats = SessionStats::new();
        stats.record_received(100);
        stats.record_analyzed(Protocol::Icmp);
        stats.reset();

        let snap = stats.snapshot();
        assert_eq!(snap, StatsSnapshot { uptime_seconds: snap.uptime_seconds, ..Default::default() });
        assert_eq!(snap.total_packets, 0);
        assert_eq!(snap.protocol_breakdown.icmp, 0);
    }

    #[test]
    fn test_drop_rate() {
        let mut snap = StatsSnapshot::default();
        assert!((snap.drop_rate() - 0.0).abs() < f64::EPSILON);

        snap.total_packets = 200;
        snap.packets_dropped = 50;
        assert!((snap.drop_rate() - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_protocol_shares() {
        let pb = ProtocolBreakdown::default();
        assert!((pb.tcp_share() - 0.0).abs() < f64::EPSILON);

        let pb = ProtocolBreakdown {
            tcp: 70,
            udp: 25,
            icmp: 5,
            other: 0,
        };
        assert_eq!(pb.total(), 100);
        assert!((pb.tcp_share() - 70.0).abs() < f64::EPSILON);
        assert!((pb.udp_share() - 25.0).abs() < f64::EPSILON);
        assert!((pb.icmp_share() - 5.0).abs() < f64::EPSILON);
        assert!((pb.other_share() - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_formatting() {
        let snap = StatsSnapshot {
            uptime_seconds: 3661,
            bytes_processed: 5 * 1024 * 1024,
            ..Default::default()
        };
        assert_eq!(snap.uptime_formatted(), "01:01:01");
        assert_eq!(snap.bytes_formatted(), "5 MB");

        let snap = StatsSnapshot {
            bytes_processed: 512,
            ..Default::default()
        };
        assert_eq!(snap.bytes_formatted(), "512 B");
    }

    #[test]
    fn test_snapshot_serde() {
        let snap = StatsSnapshot {
            total_packets: 3,
            protocol_breakdown: ProtocolBreakdown {
                tcp: 2,
                udp: 1,
                icmp: 0,
                other: 0,
            },
            ..Default::default()
        };
        let json = serde_json::to_string(&snap).unwrap();
        let back: StatsSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snap);
    }
}
