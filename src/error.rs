//! Error types for the relay.
//!
//! Each layer has its own error enum so callers can tell a skipped frame
//! from a dead capture loop.

use std::net::Ipv4Addr;

use thiserror::Error;

/// Errors produced while decoding a captured frame.
///
/// All of these are recoverable: the frame is skipped and the loop moves on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("frame does not carry an IPv4 ICMP message")]
    NotIcmp,

    #[error("unsupported ICMP type {0}")]
    UnsupportedType(u8),

    #[error("frame truncated: expected at least {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },
}

/// Errors from the packet capture layer.
///
/// Any of these ends the capture loop that hit it.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("network interface not found: {0}")]
    InterfaceNotFound(String),

    #[error("insufficient permissions - try running as root or with CAP_NET_RAW")]
    InsufficientPermissions,

    #[error("failed to create capture channel: {0}")]
    ChannelCreation(String),

    #[error("capture on {interface} failed: {source}")]
    Receive {
        interface: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from the packet injection layer.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("failed to open raw socket: {0}")]
    Socket(#[source] std::io::Error),

    #[error("failed to bind raw socket to {interface}: {source}")]
    BindDevice {
        interface: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to send packet to {dest}: {source}")]
    Send {
        dest: Ipv4Addr,
        #[source]
        source: std::io::Error,
    },

    #[error("short write to {dest}: sent {sent} of {expected} bytes")]
    ShortWrite {
        dest: Ipv4Addr,
        sent: usize,
        expected: usize,
    },

    #[error("{0} is not supported on this platform")]
    Unsupported(&'static str),
}

/// Errors while assembling the relay configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("missing required setting: {0}")]
    Missing(&'static str),
}
