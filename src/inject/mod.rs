//! Packet injection abstraction.
//!
//! The relay hands fully formed IPv4 packets to a `PacketInjector`; the
//! raw-socket implementation puts them on the wire.

mod raw_socket;

pub use raw_socket::RawSocketInjector;

use std::net::Ipv4Addr;

use crate::error::TransportError;

/// Trait for transmitting relayed packets.
pub trait PacketInjector: Send {
    /// Send one packet (IPv4 header included) towards `dest`.
    ///
    /// Failures are reported to the caller and never retried.
    fn inject(&mut self, packet: &[u8], dest: Ipv4Addr) -> Result<(), TransportError>;
}
