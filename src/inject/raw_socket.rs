//! Raw IPv4 socket injector.

use std::net::{Ipv4Addr, SocketAddrV4};

use socket2::{Domain, Protocol, Socket, Type};
use tracing::debug;

use super::PacketInjector;
use crate::error::TransportError;

/// Sends packets through a raw ICMP socket with `IP_HDRINCL` set.
///
/// The kernel routes each packet by its destination and fills in the
/// source address when the packet leaves it unspecified.
pub struct RawSocketInjector {
    socket: Socket,
    device: Option<String>,
}

impl RawSocketInjector {
    /// Open the raw socket. Requires root or `CAP_NET_RAW`.
    pub fn new() -> Result<Self, TransportError> {
        let socket = Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::ICMPV4))
            .map_err(TransportError::Socket)?;

        socket
            .set_header_included_v4(true)
            .map_err(TransportError::Socket)?;

        Ok(Self {
            socket,
            device: None,
        })
    }

    /// Restrict egress to one interface (`SO_BINDTODEVICE`).
    #[cfg(target_os = "linux")]
    pub fn bind_to_device(mut self, interface: &str) -> Result<Self, TransportError> {
        self.socket
            .bind_device(Some(interface.as_bytes()))
            .map_err(|source| TransportError::BindDevice {
                interface: interface.to_string(),
                source,
            })?;

        self.device = Some(interface.to_string());
        Ok(self)
    }

    #[cfg(not(target_os = "linux"))]
    pub fn bind_to_device(self, _interface: &str) -> Result<Self, TransportError> {
        Err(TransportError::Unsupported("SO_BINDTODEVICE"))
    }

    /// Interface the socket is bound to, if any.
    pub fn device(&self) -> Option<&str> {
        self.device.as_deref()
    }
}

impl PacketInjector for RawSocketInjector {
    fn inject(&mut self, packet: &[u8], dest: Ipv4Addr) -> Result<(), TransportError> {
        let addr = SocketAddrV4::new(dest, 0);
        let sent = self
            .socket
            .send_to(packet, &addr.into())
            .map_err(|source| TransportError::Send { dest, source })?;

        if sent != packet.len() {
            return Err(TransportError::ShortWrite {
                dest,
                sent,
                expected: packet.len(),
            });
        }

        debug!("Injected {} bytes towards {}", sent, dest);
        Ok(())
    }
}
