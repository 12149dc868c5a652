//! ICMP echo codec implementation.
//!
//! Decodes IPv4 ICMP echo messages (RFC 792) from captured frames and
//! encodes re-addressed echo packets for a raw IPv4 socket.

use std::net::Ipv4Addr;

use pnet::packet::ethernet::{EtherTypes, EthernetPacket};
use pnet::packet::icmp::IcmpPacket;
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::{Ipv4Flags, Ipv4Packet};
use pnet::packet::util::checksum;

use crate::domain::{EchoKind, IcmpFrame, LinkLayer};
use crate::error::DecodeError;

/// Ethernet II header length
const ETHERNET_HEADER_LEN: usize = 14;
/// IPv4 header length without options
const IPV4_HEADER_LEN: usize = 20;
/// ICMP echo header: type, code, checksum, identifier, sequence
const ICMP_ECHO_HEADER_LEN: usize = 8;
/// Default TTL for emitted packets
const DEFAULT_TTL: u8 = 64;

/// Offset of the embedded target address within a request payload
pub const EMBEDDED_TARGET_OFFSET: usize = 16;
/// Shortest request payload that still carries a target address
pub const MIN_REQUEST_PAYLOAD: usize = EMBEDDED_TARGET_OFFSET + 4;
/// Largest payload that fits an unfragmented IPv4 packet without options
pub const MAX_ECHO_PAYLOAD: usize = u16::MAX as usize - IPV4_HEADER_LEN - ICMP_ECHO_HEADER_LEN;

/// 16-bit word index of the checksum within each header
const ICMP_CHECKSUM_WORD: usize = 1;
const IPV4_CHECKSUM_WORD: usize = 5;

/// Codec for ICMP echo frames.
///
/// Decoding never touches the input buffer; encoding always allocates a
/// fresh packet.
#[derive(Debug, Clone)]
pub struct IcmpCodec {
    link_layer: LinkLayer,
    source: Ipv4Addr,
    ttl: u8,
}

impl IcmpCodec {
    /// Create a codec for Ethernet frames that leaves the source address to
    /// the kernel.
    pub fn new() -> Self {
        Self {
            link_layer: LinkLayer::Ethernet,
            source: Ipv4Addr::UNSPECIFIED,
            ttl: DEFAULT_TTL,
        }
    }

    /// Set the framing of captured frames.
    pub fn with_link_layer(mut self, link_layer: LinkLayer) -> Self {
        self.link_layer = link_layer;
        self
    }

    /// Set the source address written into emitted packets.
    ///
    /// `0.0.0.0` lets the kernel pick the address of the egress interface.
    pub fn with_source(mut self, source: Ipv4Addr) -> Self {
        self.source = source;
        self
    }

    /// Set the IP TTL of emitted packets.
    pub fn with_ttl(mut self, ttl: u8) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn link_layer(&self) -> LinkLayer {
        self.link_layer
    }

    /// Decode a captured frame into an echo frame.
    pub fn decode(&self, raw: &[u8]) -> Result<IcmpFrame, DecodeError> {
        let ip_bytes = self.strip_link_layer(raw)?;

        let ipv4 = Ipv4Packet::new(ip_bytes).ok_or(DecodeError::Truncated {
            expected: IPV4_HEADER_LEN,
            actual: ip_bytes.len(),
        })?;

        if ipv4.get_version() != 4 {
            return Err(DecodeError::NotIcmp);
        }

        if ipv4.get_next_level_protocol() != IpNextHeaderProtocols::Icmp {
            return Err(DecodeError::NotIcmp);
        }

        // Later fragments carry no ICMP header at all
        if ipv4.get_fragment_offset() != 0 {
            return Err(DecodeError::NotIcmp);
        }

        let header_len = ipv4.get_header_length() as usize * 4;
        if header_len < IPV4_HEADER_LEN || header_len > ip_bytes.len() {
            return Err(DecodeError::Truncated {
                expected: header_len.max(IPV4_HEADER_LEN),
                actual: ip_bytes.len(),
            });
        }

        // A first fragment holds only part of the echo data
        if ipv4.get_flags() & Ipv4Flags::MoreFragments != 0 {
            return Err(DecodeError::Truncated {
                expected: ipv4.get_total_length() as usize,
                actual: ip_bytes.len(),
            });
        }

        // Ignore link-layer padding past the IPv4 total length
        let total_len = (ipv4.get_total_length() as usize).min(ip_bytes.len());
        if total_len < header_len + ICMP_ECHO_HEADER_LEN {
            return Err(DecodeError::Truncated {
                expected: header_len + ICMP_ECHO_HEADER_LEN,
                actual: total_len,
            });
        }

        let icmp_bytes = &ip_bytes[header_len..total_len];
        let icmp = IcmpPacket::new(icmp_bytes).ok_or(DecodeError::Truncated {
            expected: ICMP_ECHO_HEADER_LEN,
            actual: icmp_bytes.len(),
        })?;

        let icmp_type = icmp.get_icmp_type().0;
        let kind = EchoKind::from_u8(icmp_type).ok_or(DecodeError::UnsupportedType(icmp_type))?;

        let identifier = u16::from_be_bytes([icmp_bytes[4], icmp_bytes[5]]);
        let sequence = u16::from_be_bytes([icmp_bytes[6], icmp_bytes[7]]);
        let payload = &icmp_bytes[ICMP_ECHO_HEADER_LEN..];

        if kind == EchoKind::Request && payload.len() < MIN_REQUEST_PAYLOAD {
            return Err(DecodeError::Truncated {
                expected: ICMP_ECHO_HEADER_LEN + MIN_REQUEST_PAYLOAD,
                actual: icmp_bytes.len(),
            });
        }

        Ok(IcmpFrame {
            source: ipv4.get_source(),
            destination: ipv4.get_destination(),
            kind,
            identifier,
            sequence,
            payload: payload.to_vec(),
        })
    }

    /// Read the target address embedded at payload offset 16..20.
    pub fn extract_embedded_target(&self, payload: &[u8]) -> Result<Ipv4Addr, DecodeError> {
        let bytes = payload
            .get(EMBEDDED_TARGET_OFFSET..MIN_REQUEST_PAYLOAD)
            .ok_or(DecodeError::Truncated {
                expected: MIN_REQUEST_PAYLOAD,
                actual: payload.len(),
            })?;

        Ok(Ipv4Addr::new(bytes[0], bytes[1], bytes[2], bytes[3]))
    }

    /// Build an IPv4 echo request to `dest`.
    ///
    /// The payload is copied unchanged, so the embedded target survives for
    /// any relay further downstream. It must not exceed `MAX_ECHO_PAYLOAD`
    /// bytes; decoded frames never do.
    pub fn encode_request(
        &self,
        dest: Ipv4Addr,
        identifier: u16,
        sequence: u16,
        payload: &[u8],
    ) -> Vec<u8> {
        self.encode(EchoKind::Request, dest, identifier, sequence, payload)
    }

    /// Build an IPv4 echo reply to `dest`. Same payload limit as
    /// [`encode_request`](Self::encode_request).
    pub fn encode_reply(
        &self,
        dest: Ipv4Addr,
        identifier: u16,
        sequence: u16,
        payload: &[u8],
    ) -> Vec<u8> {
        self.encode(EchoKind::Reply, dest, identifier, sequence, payload)
    }

    fn encode(
        &self,
        kind: EchoKind,
        dest: Ipv4Addr,
        identifier: u16,
        sequence: u16,
        payload: &[u8],
    ) -> Vec<u8> {
        debug_assert!(
            payload.len() <= MAX_ECHO_PAYLOAD,
            "echo payload of {} bytes overflows the IPv4 total length",
            payload.len()
        );
        let total_len = IPV4_HEADER_LEN + ICMP_ECHO_HEADER_LEN + payload.len();
        let mut packet = Vec::with_capacity(total_len);

        // IPv4 header: version 4, IHL 5, no options, identification and
        // flags left zero
        packet.extend_from_slice(&[0x45, 0x00]);
        packet.extend_from_slice(&(total_len as u16).to_be_bytes());
        packet.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]);
        packet.push(self.ttl);
        packet.push(IpNextHeaderProtocols::Icmp.0);
        packet.extend_from_slice(&[0x00, 0x00]);
        packet.extend_from_slice(&self.source.octets());
        packet.extend_from_slice(&dest.octets());

        let ip_checksum = checksum(&packet[..IPV4_HEADER_LEN], IPV4_CHECKSUM_WORD);
        packet[10..12].copy_from_slice(&ip_checksum.to_be_bytes());

        // ICMP echo header
        packet.extend_from_slice(&[kind.type_code(), 0, 0, 0]);
        packet.extend_from_slice(&identifier.to_be_bytes());
        packet.extend_from_slice(&sequence.to_be_bytes());
        packet.extend_from_slice(payload);

        let icmp_checksum = checksum(&packet[IPV4_HEADER_LEN..], ICMP_CHECKSUM_WORD);
        packet[IPV4_HEADER_LEN + 2..IPV4_HEADER_LEN + 4]
            .copy_from_slice(&icmp_checksum.to_be_bytes());

        packet
    }

    /// Return the IPv4 portion of a captured frame.
    fn strip_link_layer<'a>(&self, raw: &'a [u8]) -> Result<&'a [u8], DecodeError> {
        match self.link_layer {
            LinkLayer::RawIp => Ok(raw),
            LinkLayer::Ethernet => {
                let ethernet = EthernetPacket::new(raw).ok_or(DecodeError::Truncated {
                    expected: ETHERNET_HEADER_LEN,
                    actual: raw.len(),
                })?;

                if ethernet.get_ethertype() != EtherTypes::Ipv4 {
                    return Err(DecodeError::NotIcmp);
                }

                Ok(&raw[ETHERNET_HEADER_LEN..])
            }
        }
    }
}

impl Default for IcmpCodec {
    fn default() -> Self {
        Self::new()
    }
}
