//! Simulated statistics source
//!
//! Some hosts want dashboard numbers before (or without) a running session,
//! synthesized from platform-wide interface counters rather than observed
//! per-packet data. That path is deliberately a separate type: it shares the
//! [`StatsSnapshot`] shape with the real session counters but never touches
//! them, so the two can not be conflated.
//!
//! The protocol breakdown uses a fixed split (70% TCP, 25% UDP, 5% ICMP) and
//! drop/threat counts are always zero, matching what the synthetic source can
//! actually know.

use super::{ProtocolBreakdown, StatsSnapshot};

/// Platform-wide traffic totals fed into the simulator
///
/// Typically sourced from OS interface counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlatformTotals {
    /// Packets received across all interfaces
    pub rx_packets: u64,
    /// Packets transmitted across all interfaces
    pub tx_packets: u64,
    /// Bytes received across all interfaces
    pub rx_bytes: u64,
    /// Bytes transmitted across all interfaces
    pub tx_bytes: u64,
}

/// Synthesizes a [`StatsSnapshot`] from platform totals
#[derive(Debug, Clone, Copy, Default)]
pub struct SimulatedStats;

impl SimulatedStats {
    /// Create a simulated stats source
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Build a snapshot from platform totals and an uptime value
    ///
    /// Every packet counts as analyzed; nothing is ever dropped.
    #[must_use]
    pub fn snapshot(&self, totals: PlatformTotals, uptime_seconds: u64) -> StatsSnapshot {
        let total_packets = totals.rx_packets + totals.tx_packets;

        StatsSnapshot {
            total_packets,
            packets_analyzed: total_packets,
            packets_dropped: 0,
            threats_blocked: 0,
            packets_received: totals.rx_packets,
            packets_sent: totals.tx_packets,
            bytes_processed: totals.rx_bytes + totals.tx_bytes,
            uptime_seconds,
            protocol_breakdown: ProtocolBreakdown {
                tcp: total_packets * 70 / 100,
                udp: total_packets * 25 / 100,
                icmp: total_packets * 5 / 100,
                other: 0,
            },
        }
    }
}
