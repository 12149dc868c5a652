//! Packet capture abstraction.
//!
//! This module defines the `PacketCapture` trait and a pnet-based
//! implementation, so the relay loops can be driven by recorded frames in
//! tests.

mod pnet_capture;

pub use pnet_capture::{is_icmp_frame, PnetCapture};

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::error::CaptureError;

/// A raw link-layer frame captured from the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    /// The frame bytes, starting at the link-layer header
    pub data: Vec<u8>,
}

impl RawFrame {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }
}

/// Stream of captured frames. An `Err` item is fatal and ends the stream.
pub type FrameStream<'a> = Box<dyn Iterator<Item = Result<RawFrame, CaptureError>> + 'a>;

/// Trait for packet capture implementations.
///
/// Each relay loop owns one capture and drains it on its own thread.
pub trait PacketCapture: Send {
    /// Start capturing and return a lazy stream of frames that look like
    /// IPv4 ICMP.
    ///
    /// The filter is advisory; consumers must still validate every frame.
    /// The stream ends when the running flag is cleared.
    fn capture_icmp_frames(&mut self) -> Result<FrameStream<'_>, CaptureError>;

    /// Get the name of the interface being captured.
    fn interface_name(&self) -> &str;

    /// Set the running flag for graceful shutdown.
    fn set_running(&mut self, running: Arc<AtomicBool>);
}
