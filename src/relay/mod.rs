//! The relay engine.
//!
//! Two independent loops share one correlation table: the request loop
//! forwards pings to the target embedded in their payload, and the reply
//! loop sends the answers back to the original sender.

mod reply_handler;
mod request_handler;
mod runner;

pub use reply_handler::ReplyHandler;
pub use request_handler::RequestHandler;
pub use runner::{run_loop, Forward, FrameHandler};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, ScopedJoinHandle};
use std::time::{Duration, Instant};

use tracing::{error, info};

use crate::capture::PacketCapture;
use crate::codec::IcmpCodec;
use crate::correlation::CorrelationTable;
use crate::domain::{Direction, RelayEvent};
use crate::error::CaptureError;
use crate::inject::PacketInjector;
use crate::reporter::EventReporter;

/// Default period between eviction sweeps
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(10);
/// Longest the sweeper sleeps before checking for shutdown
const SWEEP_POLL: Duration = Duration::from_millis(100);

/// One side of the relay: where frames come from and where packets go.
pub struct Endpoint {
    pub capture: Box<dyn PacketCapture>,
    pub injector: Box<dyn PacketInjector>,
}

impl Endpoint {
    pub fn new(capture: Box<dyn PacketCapture>, injector: Box<dyn PacketInjector>) -> Self {
        Self { capture, injector }
    }
}

/// Runs the request loop, the reply loop and the eviction sweeper.
pub struct Relay {
    table: Arc<CorrelationTable>,
    request: RequestHandler,
    reply: ReplyHandler,
    sweep_interval: Duration,
    running: Arc<AtomicBool>,
}

impl Relay {
    pub fn new(table: Arc<CorrelationTable>, codec: IcmpCodec) -> Self {
        Self {
            request: RequestHandler::new(codec.clone(), Arc::clone(&table)),
            reply: ReplyHandler::new(codec, Arc::clone(&table)),
            table,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Get a handle to stop the relay.
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn table(&self) -> Arc<CorrelationTable> {
        Arc::clone(&self.table)
    }

    /// Run both loops until they end.
    ///
    /// A loop that dies leaves the other one running. Fails only if both
    /// loops ended with a capture error.
    pub fn run(
        &self,
        mut request_side: Endpoint,
        mut reply_side: Endpoint,
        reporter: &dyn EventReporter,
    ) -> Result<(), CaptureError> {
        reporter.on_start(
            request_side.capture.interface_name(),
            reply_side.capture.interface_name(),
        );

        request_side.capture.set_running(self.running_flag());
        reply_side.capture.set_running(self.running_flag());

        let loops_done = AtomicBool::new(false);

        let (request_result, reply_result) = thread::scope(|s| {
            let sweeper = self
                .table
                .policy()
                .ttl
                .map(|_| s.spawn(|| self.run_sweeper(&loops_done, reporter)));

            let request = s.spawn(|| {
                run_loop(
                    &self.request,
                    &mut *request_side.capture,
                    &mut *request_side.injector,
                    reporter,
                )
            });

            let reply = s.spawn(|| {
                run_loop(
                    &self.reply,
                    &mut *reply_side.capture,
                    &mut *reply_side.injector,
                    reporter,
                )
            });

            let request_result = join_loop(request, Direction::Request);
            let reply_result = join_loop(reply, Direction::Reply);

            loops_done.store(true, Ordering::SeqCst);
            if let Some(sweeper) = sweeper {
                if sweeper.join().is_err() {
                    error!("Eviction sweeper panicked");
                }
            }

            (request_result, reply_result)
        });

        reporter.on_stop();

        match (request_result, reply_result) {
            (Some(e), Some(_)) => Err(e),
            _ => Ok(()),
        }
    }

    /// Remove expired correlations once and report how many went.
    pub fn sweep_expired(&self, reporter: &dyn EventReporter) -> usize {
        let count = self.table.evict_expired();
        if count > 0 {
            reporter.report(&RelayEvent::Evicted {
                count,
                remaining: self.table.len(),
            });
        }
        count
    }

    fn run_sweeper(&self, loops_done: &AtomicBool, reporter: &dyn EventReporter) {
        let poll = SWEEP_POLL.min(self.sweep_interval);
        let mut last_sweep = Instant::now();

        while self.running.load(Ordering::SeqCst) && !loops_done.load(Ordering::SeqCst) {
            thread::sleep(poll);

            if last_sweep.elapsed() >= self.sweep_interval {
                self.sweep_expired(reporter);
                last_sweep = Instant::now();
            }
        }
    }
}

/// Wait for a loop thread and log how it ended. Returns its capture error.
fn join_loop(
    handle: ScopedJoinHandle<'_, Result<(), CaptureError>>,
    direction: Direction,
) -> Option<CaptureError> {
    match handle.join() {
        Ok(Ok(())) => {
            info!("The {} loop finished", direction);
            None
        }
        Ok(Err(e)) => {
            error!("The {} loop terminated: {}", direction, e);
            Some(e)
        }
        Err(_) => {
            error!("The {} loop panicked", direction);
            None
        }
    }
}
