//! Shared fixtures for unit tests.

use std::io;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crate::capture::{FrameStream, PacketCapture, RawFrame};
use crate::codec::IcmpCodec;
use crate::domain::RelayEvent;
use crate::error::{CaptureError, TransportError};
use crate::inject::PacketInjector;
use crate::reporter::EventReporter;

/// Wrap an IPv4 packet in an Ethernet II header.
pub fn ethernet_frame(packet: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(14 + packet.len());
    frame.extend_from_slice(&[0x02, 0x00, 0x00, 0x00, 0x00, 0x01]);
    frame.extend_from_slice(&[0x02, 0x00, 0x00, 0x00, 0x00, 0x02]);
    frame.extend_from_slice(&[0x08, 0x00]);
    frame.extend_from_slice(packet);
    frame
}

/// A 56-byte ping payload with `target` embedded at offset 16.
pub fn request_payload(target: Ipv4Addr) -> Vec<u8> {
    let mut payload = vec![0xa5; 16];
    payload.extend_from_slice(&target.octets());
    payload.extend((0..36u8).map(|i| 0x10 + i));
    payload
}

/// Ethernet frame carrying an echo request.
pub fn request_frame(src: Ipv4Addr, dst: Ipv4Addr, id: u16, seq: u16, payload: &[u8]) -> Vec<u8> {
    let packet = IcmpCodec::new()
        .with_source(src)
        .encode_request(dst, id, seq, payload);
    ethernet_frame(&packet)
}

/// Ethernet frame carrying an echo reply.
pub fn reply_frame(src: Ipv4Addr, dst: Ipv4Addr, id: u16, seq: u16, payload: &[u8]) -> Vec<u8> {
    let packet = IcmpCodec::new()
        .with_source(src)
        .encode_reply(dst, id, seq, payload);
    ethernet_frame(&packet)
}

/// Capture that replays a fixed list of frames.
pub struct MockCapture {
    name: String,
    frames: Vec<Vec<u8>>,
    fail_on_open: bool,
    fail_after_frames: bool,
    hold_open: bool,
    running: Arc<AtomicBool>,
}

impl MockCapture {
    pub fn new(name: &str, frames: Vec<Vec<u8>>) -> Self {
        Self {
            name: name.to_string(),
            frames,
            fail_on_open: false,
            fail_after_frames: false,
            hold_open: false,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Fail when the stream is opened.
    pub fn failing_on_open(mut self) -> Self {
        self.fail_on_open = true;
        self
    }

    /// Keep the stream open after the last frame until the running flag
    /// clears, like a live interface.
    pub fn holding_open(mut self) -> Self {
        self.hold_open = true;
        self
    }

    /// Yield a receive error once all frames have been delivered.
    pub fn failing_after_frames(mut self) -> Self {
        self.fail_after_frames = true;
        self
    }
}

impl PacketCapture for MockCapture {
    fn capture_icmp_frames(&mut self) -> Result<FrameStream<'_>, CaptureError> {
        if self.fail_on_open {
            return Err(CaptureError::ChannelCreation("mock open failure".to_string()));
        }

        let running = Arc::clone(&self.running);
        let frames = self
            .frames
            .clone()
            .into_iter()
            .map(|data| Ok::<_, CaptureError>(RawFrame::new(data)));

        let tail = self.fail_after_frames.then(|| {
            Err(CaptureError::Receive {
                interface: self.name.clone(),
                source: io::Error::new(io::ErrorKind::Other, "link down"),
            })
        });

        let hold_open = self.hold_open;
        let idle_running = Arc::clone(&self.running);
        let idle = std::iter::from_fn(move || {
            while hold_open && idle_running.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(5));
            }
            None
        });

        Ok(Box::new(
            frames
                .chain(tail)
                .chain(idle)
                .take_while(move |_| running.load(Ordering::SeqCst)),
        ))
    }

    fn interface_name(&self) -> &str {
        &self.name
    }

    fn set_running(&mut self, running: Arc<AtomicBool>) {
        self.running = running;
    }
}

pub type SentPackets = Arc<Mutex<Vec<(Ipv4Addr, Vec<u8>)>>>;

/// Injector that records what it was asked to send.
#[derive(Default)]
pub struct RecordingInjector {
    sent: SentPackets,
    failures_left: Arc<AtomicUsize>,
}

impl RecordingInjector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject the next `count` packets.
    pub fn failing(self, count: usize) -> Self {
        self.failures_left.store(count, Ordering::SeqCst);
        self
    }

    /// Handle to the recorded packets that survives boxing the injector.
    pub fn sent(&self) -> SentPackets {
        Arc::clone(&self.sent)
    }
}

impl PacketInjector for RecordingInjector {
    fn inject(&mut self, packet: &[u8], dest: Ipv4Addr) -> Result<(), TransportError> {
        let fail = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();

        if fail {
            return Err(TransportError::Send {
                dest,
                source: io::Error::new(io::ErrorKind::Other, "network unreachable"),
            });
        }

        self.sent
            .lock()
            .unwrap()
            .push((dest, packet.to_vec()));
        Ok(())
    }
}

/// Reporter that keeps every event for inspection.
#[derive(Default)]
pub struct RecordingReporter {
    events: Mutex<Vec<RelayEvent>>,
    started: AtomicBool,
    stopped: AtomicBool,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RelayEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub fn stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

impl EventReporter for RecordingReporter {
    fn report(&self, event: &RelayEvent) {
        self.events.lock().unwrap().push(event.clone());
    }

    fn on_start(&self, _request_interface: &str, _reply_interface: &str) {
        self.started.store(true, Ordering::SeqCst);
    }

    fn on_stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}
