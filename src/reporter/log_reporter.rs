//! tracing-based event reporter.

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, info, warn};

use crate::domain::RelayEvent;
use crate::reporter::EventReporter;

/// Counters describing what the relay has done so far.
#[derive(Debug, Default)]
pub struct RelayStats {
    requests_forwarded: AtomicU64,
    replies_forwarded: AtomicU64,
    dropped: AtomicU64,
    evicted: AtomicU64,
}

/// Point-in-time copy of `RelayStats`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    pub requests_forwarded: u64,
    pub replies_forwarded: u64,
    pub dropped: u64,
    pub evicted: u64,
}

impl RelayStats {
    pub fn record(&self, event: &RelayEvent) {
        match event {
            RelayEvent::RequestForwarded { .. } => {
                self.requests_forwarded.fetch_add(1, Ordering::Relaxed);
            }
            RelayEvent::ReplyForwarded { .. } => {
                self.replies_forwarded.fetch_add(1, Ordering::Relaxed);
            }
            RelayEvent::Dropped { .. } => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
            RelayEvent::Evicted { count, .. } => {
                self.evicted.fetch_add(*count as u64, Ordering::Relaxed);
            }
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            requests_forwarded: self.requests_forwarded.load(Ordering::Relaxed),
            replies_forwarded: self.replies_forwarded.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
        }
    }
}

/// Reports relay events through `tracing`.
///
/// Forwards are logged at info, drops at warn or debug depending on
/// whether they point at a real problem.
#[derive(Debug, Default)]
pub struct LogReporter {
    stats: RelayStats,
    /// Log routine drops at info instead of debug
    verbose: bool,
}

impl LogReporter {
    /// Create a new log reporter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable verbose output.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

impl EventReporter for LogReporter {
    fn report(&self, event: &RelayEvent) {
        self.stats.record(event);

        match event {
            RelayEvent::RequestForwarded {
                key,
                sender,
                target,
                payload_len,
                displaced,
            } => {
                if let Some(previous) = displaced {
                    warn!(
                        "Correlation {} reassigned from {} to {}",
                        key, previous, sender
                    );
                }
                info!(
                    "Forwarded echo request {} from {} to {} ({} bytes)",
                    key, sender, target, payload_len
                );
            }
            RelayEvent::ReplyForwarded {
                key,
                responder,
                sender,
                payload_len,
            } => {
                info!(
                    "Relayed echo reply {} from {} back to {} ({} bytes)",
                    key, responder, sender, payload_len
                );
            }
            RelayEvent::Dropped { direction, reason } => {
                if reason.is_noteworthy() {
                    warn!("Dropped {} frame: {}", direction, reason);
                } else if self.verbose {
                    info!("Skipped {} frame: {}", direction, reason);
                } else {
                    debug!("Skipped {} frame: {}", direction, reason);
                }
            }
            RelayEvent::Evicted { count, remaining } => {
                debug!(
                    "Evicted {} stale correlations, {} remaining",
                    count, remaining
                );
            }
        }
    }

    fn on_start(&self, request_interface: &str, reply_interface: &str) {
        info!(
            "Relaying echo requests from {} and echo replies from {}",
            request_interface, reply_interface
        );
    }

    fn on_stop(&self) {
        let stats = self.stats();
        info!(
            "Relay stopped: {} requests forwarded, {} replies relayed, {} frames dropped, {} correlations evicted",
            stats.requests_forwarded, stats.replies_forwarded, stats.dropped, stats.evicted
        );
    }
}
