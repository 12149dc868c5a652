//! Echo reply handling.

use std::sync::Arc;

use super::{Forward, FrameHandler};
use crate::codec::IcmpCodec;
use crate::correlation::CorrelationTable;
use crate::domain::{Direction, DropReason, EchoKind, RelayEvent};

/// Relays echo replies back to whoever sent the matching request.
///
/// Only reads the correlation table; entries stay until evicted, so a
/// duplicated reply is relayed again.
pub struct ReplyHandler {
    codec: IcmpCodec,
    table: Arc<CorrelationTable>,
}

impl ReplyHandler {
    pub fn new(codec: IcmpCodec, table: Arc<CorrelationTable>) -> Self {
        Self { codec, table }
    }
}

impl FrameHandler for ReplyHandler {
    fn direction(&self) -> Direction {
        Direction::Reply
    }

    fn handle(&self, raw: &[u8]) -> Result<Forward, DropReason> {
        let frame = self.codec.decode(raw).map_err(DropReason::Decode)?;

        if frame.kind != EchoKind::Reply {
            return Err(DropReason::UnexpectedKind(frame.kind));
        }

        let key = frame.key();
        let sender = self
            .table
            .lookup(key)
            .ok_or(DropReason::NoCorrelation(key))?;

        // Our own relayed reply, seen again on the way out
        if frame.destination == sender {
            return Err(DropReason::AlreadyRelayed);
        }

        let packet = self
            .codec
            .encode_reply(sender, key.identifier, key.sequence, &frame.payload);

        Ok(Forward {
            dest: sender,
            packet,
            event: RelayEvent::ReplyForwarded {
                key,
                responder: frame.source,
                sender,
                payload_len: frame.payload.len(),
            },
        })
    }
}
