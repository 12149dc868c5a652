//! ICMP echo relay.
//!
//! Echo requests captured on one interface carry a target IPv4 address at
//! a fixed payload offset. The relay forwards each request to that target,
//! remembers who sent it, and sends the target's reply back to the sender.
//!
//! The pieces, bottom up:
//! - [`codec`] decodes captured frames and builds outbound IPv4/ICMP packets
//! - [`correlation`] maps echo identifier and sequence to the original sender
//! - [`capture`] and [`inject`] are the packet I/O seams
//! - [`relay`] runs the request and reply loops
//! - [`reporter`] turns relay events into logs and counters

pub mod capture;
pub mod codec;
pub mod config;
pub mod correlation;
pub mod domain;
pub mod error;
pub mod inject;
pub mod relay;
pub mod reporter;

#[cfg(test)]
mod test_support;

pub use config::RelayConfig;
pub use error::{CaptureError, ConfigError, DecodeError, TransportError};
