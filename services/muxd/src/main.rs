//! netmux relay daemon
//!
//! Accepts framed TCP connections on one listener and relays each message
//! according to `MUXD_RELAY_MODE`.

use anyhow::{Context, Result};
use netmux_muxd::{Config, Relay};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn main() -> Result<()> {
    let config = Config::from_env()?;

    // Initialize tracing (prefer RUST_LOG, fallback to MUXD_LOG_LEVEL)
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting netmux relay");
    info!(
        listen = %config.listen,
        header_mode = %config.header_mode,
        relay_mode = ?config.relay_mode,
        idle_timeout_secs = config.idle_timeout.map(|d| d.as_secs()),
        send_limit = config.send_limit,
        max_message_size = config.max_message_size,
        rc4 = config.rc4_key.is_some(),
        allow_prefixes = config.allow.len(),
        "Configuration loaded"
    );

    let mut relay = Relay::bind(&config)
        .with_context(|| format!("Failed to start relay on {}", config.listen))?;
    info!(bind_addr = %relay.local_addr()?, "Relay listening");

    loop {
        relay
            .run_once(config.poll_interval)
            .context("Multiplexer poll failed")?;
    }
}
