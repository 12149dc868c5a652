//! ICMP echo domain types.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// The two ICMP echo message kinds the relay understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EchoKind {
    /// ICMP type 8
    Request,
    /// ICMP type 0
    Reply,
}

impl EchoKind {
    /// Map an ICMP type code to an echo kind.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            8 => Some(Self::Request),
            0 => Some(Self::Reply),
            _ => None,
        }
    }

    /// The ICMP type code for this kind.
    pub fn type_code(self) -> u8 {
        match self {
            Self::Request => 8,
            Self::Reply => 0,
        }
    }
}

impl fmt::Display for EchoKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Request => write!(f, "echo-request"),
            Self::Reply => write!(f, "echo-reply"),
        }
    }
}

/// Identifies one ping round-trip by its echo identifier and sequence.
///
/// Not globally unique: two senders using the same pair at the same time
/// collide, and the table resolves that last-writer-wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CorrelationKey {
    pub identifier: u16,
    pub sequence: u16,
}

impl CorrelationKey {
    pub fn new(identifier: u16, sequence: u16) -> Self {
        Self {
            identifier,
            sequence,
        }
    }
}

impl fmt::Display for CorrelationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "id={} seq={}", self.identifier, self.sequence)
    }
}

/// Structured view of one captured echo message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IcmpFrame {
    /// IPv4 source address
    pub source: Ipv4Addr,
    /// IPv4 destination address
    pub destination: Ipv4Addr,
    /// Echo request or reply
    pub kind: EchoKind,
    /// Echo identifier
    pub identifier: u16,
    /// Echo sequence number
    pub sequence: u16,
    /// Echo data following the 8-byte ICMP header
    pub payload: Vec<u8>,
}

impl IcmpFrame {
    pub fn key(&self) -> CorrelationKey {
        CorrelationKey::new(self.identifier, self.sequence)
    }
}

/// How captured frames are framed below the IPv4 header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkLayer {
    /// Ethernet II header in front of the IPv4 packet
    #[default]
    Ethernet,
    /// Frames start directly at the IPv4 header (tun-style interfaces)
    RawIp,
}

impl FromStr for LinkLayer {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ethernet" | "eth" => Ok(Self::Ethernet),
            "raw-ip" | "raw_ip" | "rawip" | "ip" => Ok(Self::RawIp),
            other => Err(format!("unknown link layer '{}'", other)),
        }
    }
}

impl fmt::Display for LinkLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ethernet => write!(f, "ethernet"),
            Self::RawIp => write!(f, "raw-ip"),
        }
    }
}
