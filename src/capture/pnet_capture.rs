//! pnet-based packet capture implementation.

use std::io::ErrorKind;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use pnet::datalink::{self, Channel, Config, DataLinkReceiver, NetworkInterface};
use pnet::packet::ethernet::{EtherTypes, EthernetPacket};
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::Ipv4Packet;
use pnet::packet::Packet;

use super::{FrameStream, PacketCapture, RawFrame};
use crate::domain::LinkLayer;
use crate::error::CaptureError;

/// How long a read blocks before the running flag is checked again
const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Packet capture using the pnet library.
pub struct PnetCapture {
    interface: NetworkInterface,
    link_layer: LinkLayer,
    running: Arc<AtomicBool>,
}

impl PnetCapture {
    /// Create a new capture on the specified interface.
    pub fn new(interface_name: &str, link_layer: LinkLayer) -> Result<Self, CaptureError> {
        let interface = datalink::interfaces()
            .into_iter()
            .find(|iface| iface.name == interface_name)
            .ok_or_else(|| CaptureError::InterfaceNotFound(interface_name.to_string()))?;

        Ok(Self {
            interface,
            link_layer,
            running: Arc::new(AtomicBool::new(true)),
        })
    }

    /// List all available network interfaces.
    pub fn list_interfaces() -> Vec<String> {
        datalink::interfaces()
            .into_iter()
            .map(|iface| {
                let status = if iface.is_up() { "UP" } else { "DOWN" };
                let ips: Vec<_> = iface.ips.iter().map(|ip| ip.to_string()).collect();
                format!(
                    "{}: {} [{}]",
                    iface.name,
                    status,
                    if ips.is_empty() {
                        "no IP".to_string()
                    } else {
                        ips.join(", ")
                    }
                )
            })
            .collect()
    }
}

impl PacketCapture for PnetCapture {
    fn capture_icmp_frames(&mut self) -> Result<FrameStream<'_>, CaptureError> {
        let config = Config {
            read_timeout: Some(READ_TIMEOUT),
            ..Config::default()
        };

        let rx = match datalink::channel(&self.interface, config) {
            Ok(Channel::Ethernet(_tx, rx)) => rx,
            Ok(_) => {
                return Err(CaptureError::ChannelCreation(
                    "unsupported channel type".to_string(),
                ))
            }
            Err(e) => {
                let msg = e.to_string();
                if e.kind() == ErrorKind::PermissionDenied
                    || msg.contains("permission")
                    || msg.contains("Operation not permitted")
                {
                    return Err(CaptureError::InsufficientPermissions);
                }
                return Err(CaptureError::ChannelCreation(msg));
            }
        };

        Ok(Box::new(IcmpFrameIterator {
            rx,
            interface: self.interface.name.clone(),
            link_layer: self.link_layer,
            running: Arc::clone(&self.running),
            failed: false,
        }))
    }

    fn interface_name(&self) -> &str {
        &self.interface.name
    }

    fn set_running(&mut self, running: Arc<AtomicBool>) {
        self.running = running;
    }
}

/// Iterator that yields ICMP-looking frames from the network.
struct IcmpFrameIterator {
    rx: Box<dyn DataLinkReceiver>,
    interface: String,
    link_layer: LinkLayer,
    running: Arc<AtomicBool>,
    failed: bool,
}

impl Iterator for IcmpFrameIterator {
    type Item = Result<RawFrame, CaptureError>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.failed && self.running.load(Ordering::SeqCst) {
            match self.rx.next() {
                Ok(frame) => {
                    if is_icmp_frame(frame, self.link_layer) {
                        return Some(Ok(RawFrame::new(frame.to_vec())));
                    }
                    // Not ICMP, continue listening
                }
                Err(e) => match e.kind() {
                    // Timeout is expected, it lets us poll the running flag
                    ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted => {
                        continue
                    }
                    _ => {
                        self.failed = true;
                        return Some(Err(CaptureError::Receive {
                            interface: self.interface.clone(),
                            source: e,
                        }));
                    }
                },
            }
        }

        None
    }
}

/// Cheap check whether a frame carries an IPv4 ICMP packet.
pub fn is_icmp_frame(data: &[u8], link_layer: LinkLayer) -> bool {
    match link_layer {
        LinkLayer::Ethernet => match EthernetPacket::new(data) {
            Some(ethernet) if ethernet.get_ethertype() == EtherTypes::Ipv4 => {
                is_icmp_packet(ethernet.payload())
            }
            _ => false,
        },
        LinkLayer::RawIp => is_icmp_packet(data),
    }
}

fn is_icmp_packet(data: &[u8]) -> bool {
    Ipv4Packet::new(data)
        .map(|ipv4| {
            ipv4.get_version() == 4
                && ipv4.get_next_level_protocol() == IpNextHeaderProtocols::Icmp
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::IcmpCodec;
    use crate::test_support::ethernet_frame;
    use std::net::Ipv4Addr;

    #[test]
    fn test_icmp_ethernet_frame_passes() {
        let packet = IcmpCodec::new().encode_reply(Ipv4Addr::new(10, 0, 0, 1), 1, 1, b"x");
        assert!(is_icmp_frame(&ethernet_frame(&packet), LinkLayer::Ethernet));
    }

    #[test]
    fn test_icmp_raw_ip_passes() {
        let packet = IcmpCodec::new().encode_reply(Ipv4Addr::new(10, 0, 0, 1), 1, 1, b"x");
        assert!(is_icmp_frame(&packet, LinkLayer::RawIp));
        // Same bytes read as Ethernet are garbage
        assert!(!is_icmp_frame(&packet, LinkLayer::Ethernet));
    }

    #[test]
    fn test_udp_is_filtered() {
        let mut packet = IcmpCodec::new().encode_reply(Ipv4Addr::new(10, 0, 0, 1), 1, 1, b"x");
        packet[9] = 17;
        assert!(!is_icmp_frame(&ethernet_frame(&packet), LinkLayer::Ethernet));
    }

    #[test]
    fn test_short_frames_are_filtered() {
        assert!(!is_icmp_frame(&[], LinkLayer::Ethernet));
        assert!(!is_icmp_frame(&[0x45; 10], LinkLayer::RawIp));
    }

    #[test]
    fn test_unknown_interface() {
        let result = PnetCapture::new("no-such-iface0", LinkLayer::Ethernet);
        assert!(matches!(result, Err(CaptureError::InterfaceNotFound(name)) if name == "no-such-iface0"));
    }
}
