//! Reporting module for relay events.
//!
//! This module defines the `EventReporter` trait and a tracing-backed
//! implementation that also keeps relay counters.

mod log_reporter;

pub use log_reporter::{LogReporter, RelayStats, StatsSnapshot};

use crate::domain::RelayEvent;

/// Trait for reporting relay events.
///
/// Both relay loops and the sweeper share one reporter, so implementations
/// must be usable from several threads at once.
pub trait EventReporter: Send + Sync {
    /// Report a relay event.
    fn report(&self, event: &RelayEvent);

    /// Called when the relay starts.
    fn on_start(&self, request_interface: &str, reply_interface: &str);

    /// Called when the relay stops.
    fn on_stop(&self);
}
