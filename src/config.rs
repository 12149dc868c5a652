//! Relay configuration.
//!
//! Settings come from built-in defaults, then an optional `key = value`
//! file, then `ICMP_RELAY_*` environment variables. The binary applies its
//! command line flags last.

use std::env;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::codec::IcmpCodec;
use crate::correlation::EvictionPolicy;
use crate::domain::LinkLayer;
use crate::error::ConfigError;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/icmp-relay.conf";
const CONFIG_PATH_ENV: &str = "ICMP_RELAY_CONFIG";
const ENV_PREFIX: &str = "ICMP_RELAY_";

const DEFAULT_IP_TTL: u8 = 64;
const DEFAULT_ENTRY_TTL_SECS: u64 = 60;
const DEFAULT_MAX_ENTRIES: usize = 65536;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 10;
const DEFAULT_LOG_LEVEL: &str = "info";

/// Every key understood in the config file and the environment.
const KEYS: &[&str] = &[
    "request_interface",
    "reply_interface",
    "link_layer",
    "source_address",
    "ip_ttl",
    "entry_ttl_secs",
    "max_entries",
    "sweep_interval_secs",
    "bind_egress",
    "log_level",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// Interface receiving the echo requests to relay
    pub request_interface: Option<String>,
    /// Interface receiving the echo replies from targets
    pub reply_interface: Option<String>,
    pub link_layer: LinkLayer,
    /// Source of emitted packets; unspecified lets the kernel choose
    pub source_address: Ipv4Addr,
    pub ip_ttl: u8,
    /// Correlation lifetime; `None` keeps entries forever
    pub entry_ttl: Option<Duration>,
    /// Correlation table capacity; `None` is unbounded
    pub max_entries: Option<usize>,
    pub sweep_interval: Duration,
    /// Bind each injector to the interface its packets should leave by
    pub bind_egress: bool,
    pub log_level: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            request_interface: None,
            reply_interface: None,
            link_layer: LinkLayer::Ethernet,
            source_address: Ipv4Addr::UNSPECIFIED,
            ip_ttl: DEFAULT_IP_TTL,
            entry_ttl: Some(Duration::from_secs(DEFAULT_ENTRY_TTL_SECS)),
            max_entries: Some(DEFAULT_MAX_ENTRIES),
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
            bind_egress: false,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl RelayConfig {
    /// Load defaults, the config file and environment overrides.
    ///
    /// An explicit `path` must exist. Without one, `$ICMP_RELAY_CONFIG` is
    /// used if set, else the default path if present.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        let path = path
            .map(Path::to_path_buf)
            .or_else(|| env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from));

        match path {
            Some(path) => config.apply_file(&path)?,
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_PATH);
                if default_path.exists() {
                    config.apply_file(default_path)?;
                }
            }
        }

        config.apply_env(|key| env::var(key).ok())?;

        Ok(config)
    }

    /// Apply settings from a config file.
    pub fn apply_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;

        self.apply_contents(&content)
    }

    /// Apply `key = value` lines. Blank lines, `#` comments and unknown keys
    /// are ignored.
    pub fn apply_contents(&mut self, content: &str) -> Result<(), ConfigError> {
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                self.set(key.trim(), value.trim())?;
            }
        }
        Ok(())
    }

    /// Apply `ICMP_RELAY_<KEY>` overrides found through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        for key in KEYS {
            let var = format!("{}{}", ENV_PREFIX, key.to_ascii_uppercase());
            if let Some(value) = lookup(&var) {
                self.set(key, value.trim())?;
            }
        }
        Ok(())
    }

    /// Set one setting by name. Unknown keys are ignored.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        match key {
            "request_interface" => self.request_interface = Some(parse_name(key, value)?),
            "reply_interface" => self.reply_interface = Some(parse_name(key, value)?),
            "link_layer" => self.link_layer = parse(key, value)?,
            "source_address" => self.source_address = parse(key, value)?,
            "ip_ttl" => self.ip_ttl = parse(key, value)?,
            "entry_ttl_secs" => {
                let secs: u64 = parse(key, value)?;
                self.entry_ttl = (secs > 0).then(|| Duration::from_secs(secs));
            }
            "max_entries" => {
                let max: usize = parse(key, value)?;
                self.max_entries = (max > 0).then_some(max);
            }
            "sweep_interval_secs" => {
                let secs: u64 = parse(key, value)?;
                if secs == 0 {
                    return Err(invalid(key, value));
                }
                self.sweep_interval = Duration::from_secs(secs);
            }
            "bind_egress" => self.bind_egress = parse_bool(key, value)?,
            "log_level" => self.log_level = parse_name(key, value)?,
            _ => {}
        }
        Ok(())
    }

    /// The request and reply interface names. Both are required.
    pub fn interfaces(&self) -> Result<(&str, &str), ConfigError> {
        let request = self
            .request_interface
            .as_deref()
            .ok_or(ConfigError::Missing("request_interface"))?;
        let reply = self
            .reply_interface
            .as_deref()
            .ok_or(ConfigError::Missing("reply_interface"))?;
        Ok((request, reply))
    }

    pub fn eviction_policy(&self) -> EvictionPolicy {
        EvictionPolicy {
            ttl: self.entry_ttl,
            max_entries: self.max_entries,
        }
    }

    pub fn codec(&self) -> IcmpCodec {
        IcmpCodec::new()
            .with_link_layer(self.link_layer)
            .with_source(self.source_address)
            .with_ttl(self.ip_ttl)
    }
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| invalid(key, value))
}

fn parse_name(key: &str, value: &str) -> Result<String, ConfigError> {
    if value.is_empty() {
        return Err(invalid(key, value));
    }
    Ok(value.to_string())
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(invalid(key, value)),
    }
}
