//! Relay events observed while processing echo traffic.

use std::fmt;
use std::net::Ipv4Addr;

use super::{CorrelationKey, EchoKind};
use crate::error::DecodeError;

/// Which capture loop an event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Request,
    Reply,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Request => write!(f, "request"),
            Self::Reply => write!(f, "reply"),
        }
    }
}

/// Why a captured frame produced no outbound packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    /// The frame could not be decoded as an echo message
    Decode(DecodeError),
    /// Echo message of the kind the other loop handles
    UnexpectedKind(EchoKind),
    /// Reply without an outstanding request
    NoCorrelation(CorrelationKey),
    /// A packet the relay emitted itself, captured again
    AlreadyRelayed,
    /// The injector refused the packet
    Transport(String),
}

impl DropReason {
    /// Whether this drop deserves a warning.
    ///
    /// Capture filters are advisory, so non-echo traffic and the relay's own
    /// packets show up routinely and are not worth a warning.
    pub fn is_noteworthy(&self) -> bool {
        match self {
            Self::Decode(DecodeError::Truncated { .. }) => true,
            Self::Decode(_) => false,
            Self::UnexpectedKind(_) => false,
            Self::NoCorrelation(_) => true,
            Self::AlreadyRelayed => false,
            Self::Transport(_) => true,
        }
    }
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decode(e) => write!(f, "{}", e),
            Self::UnexpectedKind(kind) => write!(f, "unexpected {}", kind),
            Self::NoCorrelation(key) => write!(f, "no outstanding request for {}", key),
            Self::AlreadyRelayed => write!(f, "packet already relayed"),
            Self::Transport(msg) => write!(f, "injection failed: {}", msg),
        }
    }
}

/// Something the relay did (or declined to do) with a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEvent {
    /// An echo request was re-addressed to its embedded target
    RequestForwarded {
        key: CorrelationKey,
        sender: Ipv4Addr,
        target: Ipv4Addr,
        payload_len: usize,
        /// Sender that previously owned the same key, if any
        displaced: Option<Ipv4Addr>,
    },
    /// An echo reply was relayed back to the original sender
    ReplyForwarded {
        key: CorrelationKey,
        responder: Ipv4Addr,
        sender: Ipv4Addr,
        payload_len: usize,
    },
    /// A frame was skipped
    Dropped {
        direction: Direction,
        reason: DropReason,
    },
    /// The sweeper removed expired correlations
    Evicted { count: usize, remaining: usize },
}

impl RelayEvent {
    pub fn dropped(direction: Direction, reason: DropReason) -> Self {
        Self::Dropped { direction, reason }
    }

    /// Check if this event produced an outbound packet.
    pub fn is_forward(&self) -> bool {
        matches!(
            self,
            Self::RequestForwarded { .. } | Self::ReplyForwarded { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncated_is_noteworthy() {
        let reason = DropReason::Decode(DecodeError::Truncated {
            expected: 28,
            actual: 12,
        });
        assert!(reason.is_noteworthy());
    }

    #[test]
    fn test_filter_noise_is_routine() {
        assert!(!DropReason::Decode(DecodeError::NotIcmp).is_noteworthy());
        assert!(!DropReason::Decode(DecodeError::UnsupportedType(3)).is_noteworthy());
        assert!(!DropReason::UnexpectedKind(EchoKind::Reply).is_noteworthy());
        assert!(!DropReason::AlreadyRelayed.is_noteworthy());
    }

    #[test]
    fn test_orphan_reply_is_noteworthy() {
        let reason = DropReason::NoCorrelation(CorrelationKey::new(1, 2));
        assert!(reason.is_noteworthy());
        assert_eq!(reason.to_string(), "no outstanding request for id=1 seq=2");
    }

    #[test]
    fn test_is_forward() {
        let forwarded = RelayEvent::ReplyForwarded {
            key: CorrelationKey::new(1, 1),
            responder: Ipv4Addr::new(8, 8, 8, 8),
            sender: Ipv4Addr::new(192, 168, 1, 5),
            payload_len: 56,
        };
        assert!(forwarded.is_forward());

        let dropped = RelayEvent::dropped(Direction::Reply, DropReason::AlreadyRelayed);
        assert!(!dropped.is_forward());
    }
}
