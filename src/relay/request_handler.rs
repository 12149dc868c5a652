//! Echo request handling.

use std::sync::Arc;

use super::{Forward, FrameHandler};
use crate::codec::IcmpCodec;
use crate::correlation::CorrelationTable;
use crate::domain::{Direction, DropReason, EchoKind, RelayEvent};

/// Turns captured echo requests into requests towards their embedded target.
///
/// Every forwarded request leaves a correlation entry behind so the reply
/// handler can find the original sender.
pub struct RequestHandler {
    codec: IcmpCodec,
    table: Arc<CorrelationTable>,
}

impl RequestHandler {
    pub fn new(codec: IcmpCodec, table: Arc<CorrelationTable>) -> Self {
        Self { codec, table }
    }
}

impl FrameHandler for RequestHandler {
    fn direction(&self) -> Direction {
        Direction::Request
    }

    fn handle(&self, raw: &[u8]) -> Result<Forward, DropReason> {
        let frame = self.codec.decode(raw).map_err(DropReason::Decode)?;

        if frame.kind != EchoKind::Request {
            return Err(DropReason::UnexpectedKind(frame.kind));
        }

        // Decoding already rejected requests too short to carry a target
        let target = self
            .codec
            .extract_embedded_target(&frame.payload)
            .map_err(DropReason::Decode)?;

        // Our own forwarded request, seen again on the way out
        if frame.destination == target {
            return Err(DropReason::AlreadyRelayed);
        }

        let key = frame.key();
        let displaced = self
            .table
            .insert(key, frame.source)
            .filter(|previous| *previous != frame.source);

        let packet = self
            .codec
            .encode_request(target, key.identifier, key.sequence, &frame.payload);

        Ok(Forward {
            dest: target,
            packet,
            event: RelayEvent::RequestForwarded {
                key,
                sender: frame.source,
                target,
                payload_len: frame.payload.len(),
                displaced,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CorrelationKey;
    use crate::error::DecodeError;
    use crate::test_support::{ethernet_frame, reply_frame, request_frame, request_payload};
    use std::net::Ipv4Addr;

    const SENDER: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 5);
    const RELAY: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 1);
    const TARGET: Ipv4Addr = Ipv4Addr::new(8, 8, 8, 8);

    fn handler() -> (RequestHandler, Arc<CorrelationTable>) {
        let table = Arc::new(CorrelationTable::new());
        (RequestHandler::new(IcmpCodec::new(), Arc::clone(&table)), table)
    }

    #[test]
    fn test_forwards_to_embedded_target() {
        let (handler, table) = handler();
        let payload = request_payload(TARGET);
        let frame = request_frame(SENDER, RELAY, 42, 1, &payload);

        let forward = handler.handle(&frame).unwrap();

        assert_eq!(forward.dest, TARGET);
        assert_eq!(table.lookup(CorrelationKey::new(42, 1)), Some(SENDER));

        let sent = IcmpCodec::new()
            .with_link_layer(crate::domain::LinkLayer::RawIp)
            .decode(&forward.packet)
            .unwrap();
        assert_eq!(sent.kind, EchoKind::Request);
        assert_eq!(sent.destination, TARGET);
        assert_eq!(sent.identifier, 42);
        assert_eq!(sent.sequence, 1);
        assert_eq!(sent.payload, payload);

        assert_eq!(
            forward.event,
            RelayEvent::RequestForwarded {
                key: CorrelationKey::new(42, 1),
                sender: SENDER,
                target: TARGET,
                payload_len: payload.len(),
                displaced: None,
            }
        );
    }

    #[test]
    fn test_truncated_payload_leaves_table_untouched() {
        let (handler, table) = handler();
        let frame = request_frame(SENDER, RELAY, 42, 1, &[0u8; 12]);

        let result = handler.handle(&frame);

        assert!(matches!(
            result,
            Err(DropReason::Decode(DecodeError::Truncated { .. }))
        ));
        assert!(table.is_empty());
    }

    #[test]
    fn test_reply_is_not_handled() {
        let (handler, table) = handler();
        let frame = reply_frame(TARGET, RELAY, 42, 1, &request_payload(TARGET));

        let result = handler.handle(&frame);

        assert!(matches!(
            result,
            Err(DropReason::UnexpectedKind(EchoKind::Reply))
        ));
        assert!(table.is_empty());
    }

    #[test]
    fn test_non_icmp_is_skipped() {
        let (handler, _) = handler();
        let mut packet = IcmpCodec::new().encode_request(RELAY, 1, 1, &request_payload(TARGET));
        packet[9] = 6;

        let result = handler.handle(&ethernet_frame(&packet));
        assert!(matches!(result, Err(DropReason::Decode(DecodeError::NotIcmp))));
    }

    #[test]
    fn test_own_forwarded_request_is_ignored() {
        let (handler, table) = handler();
        // Already addressed to the target embedded in it
        let frame = request_frame(RELAY, TARGET, 42, 1, &request_payload(TARGET));

        let result = handler.handle(&frame);

        assert!(matches!(result, Err(DropReason::AlreadyRelayed)));
        assert!(table.is_empty());
    }

    #[test]
    fn test_colliding_key_reports_displaced_sender() {
        let (handler, table) = handler();
        let other = Ipv4Addr::new(192, 168, 1, 6);
        let payload = request_payload(TARGET);

        handler
            .handle(&request_frame(SENDER, RELAY, 42, 1, &payload))
            .unwrap();
        let forward = handler
            .handle(&request_frame(other, RELAY, 42, 1, &payload))
            .unwrap();

        assert!(matches!(
            forward.event,
            RelayEvent::RequestForwarded { displaced: Some(previous), .. } if previous == SENDER
        ));
        assert_eq!(table.lookup(CorrelationKey::new(42, 1)), Some(other));
    }

    #[test]
    fn test_repeated_request_from_same_sender_is_not_a_collision() {
        let (handler, _) = handler();
        let payload = request_payload(TARGET);

        handler
            .handle(&request_frame(SENDER, RELAY, 42, 1, &payload))
            .unwrap();
        let forward = handler
            .handle(&request_frame(SENDER, RELAY, 42, 1, &payload))
            .unwrap();

        assert!(matches!(
            forward.event,
            RelayEvent::RequestForwarded { displaced: None, .. }
        ));
    }

    #[test]
    fn test_shortest_payload_with_target_is_forwarded() {
        let (handler, table) = handler();
        let mut payload = vec![0u8; 16];
        payload.extend_from_slice(&TARGET.octets());

        let forward = handler
            .handle(&request_frame(SENDER, RELAY, 9, 9, &payload))
            .unwrap();

        assert_eq!(forward.dest, TARGET);
        assert_eq!(table.lookup(CorrelationKey::new(9, 9)), Some(SENDER));
    }

    #[test]
    fn test_payload_one_byte_short_is_a_noteworthy_drop() {
        let (handler, table) = handler();
        let mut payload = vec![0u8; 16];
        payload.extend_from_slice(&TARGET.octets()[..3]);

        let reason = handler
            .handle(&request_frame(SENDER, RELAY, 9, 9, &payload))
            .unwrap_err();

        assert!(matches!(
            reason,
            DropReason::Decode(DecodeError::Truncated { .. })
        ));
        assert!(reason.is_noteworthy());
        assert!(table.is_empty());
    }
}
