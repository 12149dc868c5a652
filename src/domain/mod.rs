//! Domain models for the ICMP relay.
//!
//! These types describe echo traffic and relay observations independently
//! of how frames are captured or injected.

mod events;
mod icmp;

pub use events::{Direction, DropReason, RelayEvent};
pub use icmp::{CorrelationKey, EchoKind, IcmpFrame, LinkLayer};
