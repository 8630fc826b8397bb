//! Serial Bridge: entry point.
//!
//! This binary exposes the serial ports of the host it runs on to web pages
//! over a WebSocket endpoint.  A page can list the attached ports, open one at
//! a chosen baud rate, send lines to it and receive every line the device
//! prints, all as small JSON messages.
//!
//! # Why a separate bridge process?
//!
//! Web pages cannot open serial ports themselves on most browsers.  This
//! process owns the ports and speaks WebSocket, which every browser can.
//!
//! # Usage
//!
//! ```text
//! serial-bridge [OPTIONS]
//!
//! Options:
//!   --bind            <IP>     Address to listen on [default: 0.0.0.0]
//!   --port            <PORT>   WebSocket listener port [default: 8080]
//!   --max-record-len  <BYTES>  Longest line buffered per device [default: 65536]
//!   --event-queue     <N>      Device event queue capacity [default: 256]
//!   --read-timeout-ms <MS>     Serial read poll interval [default: 50]
//!   --log-level       <LEVEL>  Log level when RUST_LOG is unset [default: info]
//!   --config          <PATH>   TOML config file
//! ```
//!
//! # Environment variable overrides
//!
//! Every option can also be set with an environment variable.  Resolution
//! order is: CLI flag, then environment variable, then the config file, then
//! the built-in default.
//!
//! | Variable                        | Default   |
//! |---------------------------------|-----------|
//! | `SERIAL_BRIDGE_BIND`            | `0.0.0.0` |
//! | `SERIAL_BRIDGE_PORT`            | `8080`    |
//! | `SERIAL_BRIDGE_MAX_RECORD_LEN`  | `65536`   |
//! | `SERIAL_BRIDGE_EVENT_QUEUE`     | `256`     |
//! | `SERIAL_BRIDGE_READ_TIMEOUT_MS` | `50`      |
//! | `SERIAL_BRIDGE_LOG_LEVEL`       | `info`    |
//! | `SERIAL_BRIDGE_CONFIG`          | (none)    |

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use serial_bridge::domain::BridgeConfig;
use serial_bridge::infrastructure::{load_config, Gateway, SystemSerialDriver};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Serial-port-to-WebSocket bridge.
///
/// Every field is optional so that an absent flag falls through to the
/// config file and then to the built-in default.
#[derive(Debug, Default, Parser)]
#[command(
    name = "serial-bridge",
    about = "Expose local serial ports to web clients over WebSocket",
    version
)]
struct Cli {
    /// IP address to bind the WebSocket server to.
    ///
    /// Use `0.0.0.0` to accept connections from any interface, or
    /// `127.0.0.1` to accept only local connections.
    #[arg(long, env = "SERIAL_BRIDGE_BIND")]
    bind: Option<IpAddr>,

    /// TCP port for the WebSocket server to listen on.
    #[arg(long, env = "SERIAL_BRIDGE_PORT")]
    port: Option<u16>,

    /// Maximum bytes buffered per device while waiting for a newline.
    #[arg(long, env = "SERIAL_BRIDGE_MAX_RECORD_LEN")]
    max_record_len: Option<usize>,

    /// Capacity of each session's device event queue.
    #[arg(long, env = "SERIAL_BRIDGE_EVENT_QUEUE")]
    event_queue: Option<usize>,

    /// Serial read timeout in milliseconds.
    #[arg(long, env = "SERIAL_BRIDGE_READ_TIMEOUT_MS")]
    read_timeout_ms: Option<u64>,

    /// Log level used when `RUST_LOG` is not set.
    #[arg(long, env = "SERIAL_BRIDGE_LOG_LEVEL")]
    log_level: Option<String>,

    /// Path of a TOML config file with a `[bridge]` section.
    #[arg(long, env = "SERIAL_BRIDGE_CONFIG")]
    config: Option<PathBuf>,
}

impl Cli {
    /// Resolves the final [`BridgeConfig`]: flags over the config file over
    /// defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be loaded or the resulting
    /// configuration is invalid (e.g. a zero queue capacity).
    fn into_bridge_config(self) -> anyhow::Result<BridgeConfig> {
        let base = match &self.config {
            Some(path) => load_config(path)
                .with_context(|| format!("failed to load config file {}", path.display()))?,
            None => BridgeConfig::default(),
        };

        let config = BridgeConfig {
            bind_addr: SocketAddr::new(
                self.bind.unwrap_or(base.bind_addr.ip()),
                self.port.unwrap_or(base.bind_addr.port()),
            ),
            max_record_len: self.max_record_len.unwrap_or(base.max_record_len),
            event_queue_capacity: self.event_queue.unwrap_or(base.event_queue_capacity),
            read_timeout: self
                .read_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(base.read_timeout),
            log_level: self.log_level.unwrap_or(base.log_level),
        };

        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Program entry point.
///
/// # What happens at startup
///
/// 1. CLI arguments (and their environment variables) are parsed with `clap`
///    and merged with the optional config file into a [`BridgeConfig`].
/// 2. `tracing_subscriber` is initialised.  `RUST_LOG` wins; otherwise the
///    configured log level applies.
/// 3. The [`Gateway`] is started with the real serial driver.
/// 4. On Ctrl+C the gateway is stopped: every session closes its port and
///    its WebSocket before the process exits.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Cli::parse().into_bridge_config()?;

    // ── Logging setup ─────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    info!(
        "serial bridge starting: bind={}, max_record_len={}, event_queue={}",
        config.bind_addr, config.max_record_len, config.event_queue_capacity
    );

    let driver = Arc::new(SystemSerialDriver::new(config.read_timeout));
    let mut gateway = Gateway::new(config, driver);
    gateway.start().await?;

    // ── Graceful shutdown ─────────────────────────────────────────────────────
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("received Ctrl+C; initiating graceful shutdown"),
        Err(e) => error!("failed to listen for Ctrl+C signal: {e}"),
    }

    gateway.stop().await;
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
