//! IPv4 packet header parsing
//!
//! The forwarding loop hands every packet it reads from the tunnel device to
//! [`Ipv4Header::parse`], which decodes the fixed-offset fields the rule
//! engine matches on. Parsing is a pure function over the input bytes.
//!
//! # Non-IPv4 traffic
//!
//! `parse` records the version nibble but does not reject other versions:
//! a long-enough IPv6 packet is decoded using the same fixed offsets, which
//! misinterprets its contents as IPv4 address bytes. Callers that care can
//! check [`Ipv4Header::version`]; the forwarding loop forwards such packets
//! best-effort and classifies them by whatever the protocol byte says.

use std::fmt;
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use crate::error::PacketError;

/// Minimum IPv4 header size in bytes (fixed header, no options)
pub const MIN_HEADER_LEN: usize = 20;

/// Maximum packet size read from the tunnel device in one iteration
pub const MAX_PACKET_SIZE: usize = 32767;

/// IP protocol classification (IANA protocol numbers)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Protocol {
    /// TCP (protocol number 6)
    #[serde(rename = "tcp")]
    Tcp,

    /// UDP (protocol number 17)
    #[serde(rename = "udp")]
    Udp,

    /// ICMP (protocol number 1)
    #[serde(rename = "icmp")]
    Icmp,

    /// Any other protocol number
    #[serde(rename = "other")]
    Other(u8),
}

impl Protocol {
    /// Classify an IANA protocol number
    #[must_use]
    pub const fn from_number(n: u8) -> Self {
        match n {
            6 => Self::Tcp,
            17 => Self::Udp,
            1 => Self::Icmp,
            other => Self::Other(other),
        }
    }

    /// The IANA protocol number
    #[must_use]
    pub const fn number(&self) -> u8 {
        match self {
            Self::Tcp => 6,
            Self::Udp => 17,
            Self::Icmp => 1,
            Self::Other(n) => *n,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp => write!(f, "tcp"),
            Self::Udp => write!(f, "udp"),
            Self::Icmp => write!(f, "icmp"),
            Self::Other(n) => write!(f, "other({n})"),
        }
    }
}

/// Parsed IPv4 header fields
///
/// A read-only view derived from one packet buffer; never retained across
/// forwarding-loop iterations.
///
/// # Example
///
/// ```
/// use tun_firewall::packet::{Ipv4Header, Protocol};
///
/// let mut buf = [0u8; 20];
/// buf[0] = 0x45; // version 4, IHL 5
/// buf[9] = 6; // TCP
/// buf[16..20].copy_from_slice(&[8, 8, 8, 8]);
///
/// let header = Ipv4Header::parse(&buf).unwrap();
/// assert_eq!(header.version, 4);
/// assert_eq!(header.protocol, Protocol::Tcp);
/// assert_eq!(header.destination, "8.8.8.8".parse::<std::net::Ipv4Addr>().unwrap());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Header {
    /// IP version nibble (high 4 bits of byte 0); not validated to be 4
    pub version: u8,

    /// Protocol classification from byte 9
    pub protocol: Protocol,

    /// Source address (bytes 12..16)
    pub source: Ipv4Addr,

    /// Destination address (bytes 16..20)
    pub destination: Ipv4Addr,
}

impl Ipv4Header {
    /// Parse the fixed-offset header fields from a packet buffer
    ///
    /// # Errors
    ///
    /// Returns [`PacketError::Malformed`] when the buffer is shorter than
    /// [`MIN_HEADER_LEN`]; the fixed offsets cannot be read safely.
    pub fn parse(buf: &[u8]) -> Result<Self, PacketError> {
        if buf.len() < MIN_HEADER_LEN {
            return Err(PacketError::Malformed {
                len: buf.len(),
                min: MIN_HEADER_LEN,
            });
        }

        let src = [buf[12], buf[13], buf[14], buf[15]];
        let dst = [buf[16], buf[17], buf[18], buf[19]];

        Ok(Self {
            version: buf[0] >> 4,
            protocol: Protocol::from_number(buf[9]),
            source: Ipv4Addr::from(src),
            destination: Ipv4Addr::from(dst),
        })
    }

    /// Whether the version nibble claims IPv4
    #[must_use]
    pub const fn is_ipv4(&self) -> bool {
        self.version == 4
    }
}
