//! icmp-relay - ICMP echo relay
//!
//! Captures echo requests on one interface, forwards them to the IPv4
//! address embedded in their payload, and sends the replies back to the
//! original sender.

use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use icmp_relay::capture::PnetCapture;
use icmp_relay::config::RelayConfig;
use icmp_relay::correlation::CorrelationTable;
use icmp_relay::domain::LinkLayer;
use icmp_relay::inject::RawSocketInjector;
use icmp_relay::relay::{Endpoint, Relay};
use icmp_relay::reporter::LogReporter;

#[derive(Parser, Debug)]
#[command(name = "icmp-relay")]
#[command(about = "Relays ICMP echo traffic to the target embedded in the echo payload")]
#[command(version)]
struct Args {
    /// Interface where echo requests arrive
    #[arg(short = 'i', long)]
    request_interface: Option<String>,

    /// Interface where echo replies from targets arrive
    #[arg(short = 'o', long)]
    reply_interface: Option<String>,

    /// Config file (default: $ICMP_RELAY_CONFIG or /etc/icmp-relay.conf)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Seconds a correlation stays valid (0 keeps entries forever)
    #[arg(long, value_name = "SECS")]
    entry_ttl: Option<u64>,

    /// Correlation table capacity (0 for unbounded)
    #[arg(long)]
    max_entries: Option<usize>,

    /// Source address for relayed packets
    #[arg(long)]
    source_address: Option<Ipv4Addr>,

    /// Capture interfaces carry bare IPv4 packets with no Ethernet header
    #[arg(long)]
    raw_ip: bool,

    /// Bind each injector to the interface its packets leave by
    #[arg(long)]
    bind_egress: bool,

    /// Log every relay decision
    #[arg(short, long)]
    verbose: bool,

    /// List available network interfaces and exit
    #[arg(long)]
    list_interfaces: bool,
}

impl Args {
    /// Command line flags override the file and the environment.
    fn apply_to(&self, config: &mut RelayConfig) -> Result<()> {
        if let Some(name) = &self.request_interface {
            config.set("request_interface", name)?;
        }
        if let Some(name) = &self.reply_interface {
            config.set("reply_interface", name)?;
        }
        if let Some(secs) = self.entry_ttl {
            config.set("entry_ttl_secs", &secs.to_string())?;
        }
        if let Some(max) = self.max_entries {
            config.set("max_entries", &max.to_string())?;
        }
        if let Some(addr) = self.source_address {
            config.source_address = addr;
        }
        if self.raw_ip {
            config.link_layer = LinkLayer::RawIp;
        }
        if self.bind_egress {
            config.bind_egress = true;
        }
        Ok(())
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.list_interfaces {
        println!("Available network interfaces:");
        for name in PnetCapture::list_interfaces() {
            println!("  {}", name);
        }
        return Ok(());
    }

    let mut config =
        RelayConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    args.apply_to(&mut config)?;

    init_logging(&config, args.verbose);

    run(&config, args.verbose)
}

fn init_logging(config: &RelayConfig, verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run(config: &RelayConfig, verbose: bool) -> Result<()> {
    let (request_interface, reply_interface) = config.interfaces()?;

    warn_if_unprivileged();

    let request_capture = PnetCapture::new(request_interface, config.link_layer)
        .with_context(|| format!("Failed to open capture on {}", request_interface))?;
    let reply_capture = PnetCapture::new(reply_interface, config.link_layer)
        .with_context(|| format!("Failed to open capture on {}", reply_interface))?;

    let mut request_injector =
        RawSocketInjector::new().context("Failed to open raw injection socket")?;
    let mut reply_injector =
        RawSocketInjector::new().context("Failed to open raw injection socket")?;

    // Forwarded requests leave towards the targets, relayed replies towards the senders
    if config.bind_egress {
        request_injector = request_injector
            .bind_to_device(reply_interface)
            .context("Failed to bind request injector")?;
        reply_injector = reply_injector
            .bind_to_device(request_interface)
            .context("Failed to bind reply injector")?;
    }

    let policy = config.eviction_policy();
    info!(
        "Correlation entries: ttl {}, capacity {}",
        policy
            .ttl
            .map_or_else(|| "none".to_string(), |ttl| format!("{}s", ttl.as_secs())),
        policy
            .max_entries
            .map_or_else(|| "unbounded".to_string(), |max| max.to_string()),
    );

    let table = Arc::new(CorrelationTable::with_policy(policy));
    let relay = Relay::new(table, config.codec()).with_sweep_interval(config.sweep_interval);

    install_shutdown_handler(relay.running_flag())
        .context("Failed to set shutdown signal handler")?;

    let reporter = LogReporter::new().with_verbose(verbose);

    relay
        .run(
            Endpoint::new(Box::new(request_capture), Box::new(request_injector)),
            Endpoint::new(Box::new(reply_capture), Box::new(reply_injector)),
            &reporter,
        )
        .context("Relay stopped with errors")?;

    Ok(())
}

/// Clear `running` on SIGINT or SIGTERM so the relay winds down cleanly.
fn install_shutdown_handler(running: Arc<AtomicBool>) -> Result<(), ctrlc::Error> {
    ctrlc::set_handler(move || {
        info!("Received shutdown signal, stopping relay");
        running.store(false, Ordering::SeqCst);
    })
}

#[cfg(target_os = "linux")]
fn warn_if_unprivileged() {
    // SAFETY: geteuid has no preconditions and cannot fail
    if unsafe { libc::geteuid() } != 0 {
        warn!("Not running as root; capture and injection need CAP_NET_RAW");
    }
}

#[cfg(not(target_os = "linux"))]
fn warn_if_unprivileged() {}
