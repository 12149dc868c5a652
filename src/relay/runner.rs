//! The per-interface frame loop.

use std::net::Ipv4Addr;

use crate::capture::PacketCapture;
use crate::domain::{Direction, DropReason, RelayEvent};
use crate::error::CaptureError;
use crate::inject::PacketInjector;
use crate::reporter::EventReporter;

/// A packet ready for injection, plus the event to report once it is sent.
#[derive(Debug, Clone)]
pub struct Forward {
    pub dest: Ipv4Addr,
    pub packet: Vec<u8>,
    pub event: RelayEvent,
}

/// Turns one captured frame into at most one outbound packet.
pub trait FrameHandler: Sync {
    fn direction(&self) -> Direction;

    fn handle(&self, raw: &[u8]) -> Result<Forward, DropReason>;
}

/// Drain `capture` through `handler` into `injector`.
///
/// Reports exactly one event per frame. Returns when the capture stream
/// ends, or with the capture error that ended it.
pub fn run_loop<H: FrameHandler + ?Sized>(
    handler: &H,
    capture: &mut dyn PacketCapture,
    injector: &mut dyn PacketInjector,
    reporter: &dyn EventReporter,
) -> Result<(), CaptureError> {
    let direction = handler.direction();

    for item in capture.capture_icmp_frames()? {
        let frame = item?;

        let event = match handler.handle(&frame.data) {
            Ok(forward) => match injector.inject(&forward.packet, forward.dest) {
                Ok(()) => forward.event,
                Err(e) => RelayEvent::dropped(direction, DropReason::Transport(e.to_string())),
            },
            Err(reason) => RelayEvent::dropped(direction, reason),
        };

        reporter.report(&event);
    }

    Ok(())
}
