//! Relay configuration.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use netmux_core::{CoreConfig, HeaderMode, DEFAULT_MAX_MESSAGE_SIZE};
use netmux_networking::AllowList;

/// What the relay does with each received message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RelayMode {
    /// Send it back to the sender.
    #[default]
    Echo,
    /// Send it to every other inbound connection.
    Broadcast,
}

impl FromStr for RelayMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "echo" => Ok(RelayMode::Echo),
            "broadcast" => Ok(RelayMode::Broadcast),
            other => bail!("unknown relay mode '{}' (expected echo or broadcast)", other),
        }
    }
}

/// Relay configuration (env-driven).
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the single listener binds to.
    pub listen: SocketAddr,

    /// Framing used by every connection.
    pub header_mode: HeaderMode,

    pub relay_mode: RelayMode,

    /// Evict connections idle this long.
    pub idle_timeout: Option<Duration>,

    /// Send-queue ceiling per connection (0 = unlimited).
    pub send_limit: usize,

    /// Largest accepted frame, header included.
    pub max_message_size: usize,

    /// RC4 key installed on both directions of each accepted connection.
    pub rc4_key: Option<Vec<u8>>,

    /// Peers allowed to connect. Empty admits everyone.
    pub allow: AllowList,

    /// Upper bound on one poll.
    pub poll_interval: Duration,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 7000)),
            header_mode: HeaderMode::default(),
            relay_mode: RelayMode::default(),
            idle_timeout: None,
            send_limit: 0,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            rc4_key: None,
            allow: AllowList::new(),
            poll_interval: Duration::from_millis(100),
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`, which maps a variable name to its value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let listen = lookup("MUXD_LISTEN")
            .map(|v| v.parse())
            .transpose()
            .context("MUXD_LISTEN must be a socket address (example: 0.0.0.0:7000).")?
            .unwrap_or(defaults.listen);

        let header_mode = lookup("MUXD_HEADER_MODE")
            .map(|v| v.parse())
            .transpose()
            .context("MUXD_HEADER_MODE must be 0-13 or a mode name such as dword-lsb.")?
            .unwrap_or(defaults.header_mode);

        let relay_mode = lookup("MUXD_RELAY_MODE")
            .map(|v| v.parse())
            .transpose()
            .context("MUXD_RELAY_MODE is invalid.")?
            .unwrap_or(defaults.relay_mode);

        let idle_secs: u64 = lookup("MUXD_IDLE_TIMEOUT_SECS")
            .map(|v| v.parse())
            .transpose()
            .context("MUXD_IDLE_TIMEOUT_SECS must be an integer (seconds).")?
            .unwrap_or(0);
        let idle_timeout = (idle_secs > 0).then(|| Duration::from_secs(idle_secs));

        let send_limit = lookup("MUXD_SEND_LIMIT")
            .map(|v| v.parse())
            .transpose()
            .context("MUXD_SEND_LIMIT must be an integer (bytes).")?
            .unwrap_or(defaults.send_limit);

        let max_message_size = lookup("MUXD_MAX_MESSAGE_SIZE")
            .map(|v| v.parse())
            .transpose()
            .context("MUXD_MAX_MESSAGE_SIZE must be an integer (bytes).")?
            .unwrap_or(defaults.max_message_size);

        let rc4_key = lookup("MUXD_RC4_KEY")
            .filter(|v| !v.is_empty())
            .map(String::into_bytes);
        if let Some(key) = &rc4_key {
            if key.len() > 256 {
                bail!("MUXD_RC4_KEY must be at most 256 bytes, got {}.", key.len());
            }
        }

        let allow = lookup("MUXD_ALLOW")
            .map(|v| AllowList::parse(&v))
            .transpose()
            .context("MUXD_ALLOW must be a comma-separated list of IPs or CIDR prefixes.")?
            .unwrap_or_default();

        let poll_interval_ms: u64 = lookup("MUXD_POLL_INTERVAL_MS")
            .map(|v| v.parse())
            .transpose()
            .context("MUXD_POLL_INTERVAL_MS must be an integer (milliseconds).")?
            .unwrap_or(100);
        let poll_interval = Duration::from_millis(poll_interval_ms.clamp(1, 60_000));

        let log_level = lookup("MUXD_LOG_LEVEL").unwrap_or(defaults.log_level);

        Ok(Self {
            listen,
            header_mode,
            relay_mode,
            idle_timeout,
            send_limit,
            max_message_size,
            rc4_key,
            allow,
            poll_interval,
            log_level,
        })
    }

    /// Multiplexer settings derived from this configuration.
    pub fn core_config(&self) -> CoreConfig {
        CoreConfig {
            idle_timeout: self.idle_timeout,
            ..CoreConfig::default()
        }
        .with_limits(self.send_limit, self.max_message_size)
    }
}
