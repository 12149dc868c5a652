//! ICMP echo packet codec.
//!
//! This module translates between raw captured bytes and domain echo
//! frames, and builds the IPv4 packets the relay sends out.

mod icmp_codec;

pub use icmp_codec::{IcmpCodec, EMBEDDED_TARGET_OFFSET, MAX_ECHO_PAYLOAD, MIN_REQUEST_PAYLOAD};
