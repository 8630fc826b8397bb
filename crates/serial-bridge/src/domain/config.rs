//! Bridge configuration types.
//!
//! [`BridgeConfig`] is the single source of truth for all runtime settings.
//! It can be constructed from CLI arguments, from a TOML file, or from
//! sensible defaults (useful for local development and tests).
//!
//! Keeping configuration as a plain struct (no global state, no environment
//! variable reads inside the domain) makes the gateway easy to embed in
//! tests.  `main.rs` and the infrastructure layer are responsible for
//! populating it.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use serial_bridge_core::DEFAULT_MAX_RECORD_LEN;
use thiserror::Error;

/// Default WebSocket listener port.
pub const DEFAULT_PORT: u16 = 8080;

/// Default capacity of each session's device event queue.
pub const DEFAULT_EVENT_QUEUE_CAPACITY: usize = 256;

/// Default serial read timeout.  Bounds how long a closed device's reader
/// thread can linger before it notices the close.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(50);

/// Default `tracing` filter when `RUST_LOG` is not set.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// A configuration value that would make the gateway misbehave.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A size or count that must be positive was zero.
    #[error("{field} must be greater than zero")]
    Zero {
        /// Name of the offending setting.
        field: &'static str,
    },

    /// An address string could not be parsed.
    #[error("invalid bind address: '{0}'")]
    InvalidAddress(String),
}

/// All runtime configuration for the serial bridge.
///
/// # Example
///
/// ```rust
/// use serial_bridge::domain::BridgeConfig;
///
/// let cfg = BridgeConfig::default();
/// assert_eq!(cfg.bind_addr.port(), 8080);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeConfig {
    /// Address the WebSocket server binds to.  Port `0` asks the OS for a
    /// free port, which tests rely on.
    pub bind_addr: SocketAddr,

    /// Maximum number of undelimited bytes buffered per device before the
    /// framer discards them and reports an error.
    pub max_record_len: usize,

    /// Capacity of the per-session queue carrying device byte chunks and
    /// driver errors to the session task.
    pub event_queue_capacity: usize,

    /// Serial read timeout used by the device reader thread.
    pub read_timeout: Duration,

    /// Fallback log filter (`error` … `trace`) used when `RUST_LOG` is unset.
    pub log_level: String,
}

impl BridgeConfig {
    /// Checks the values that would otherwise panic or misbehave at runtime.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Zero`] for a zero record length, queue
    /// capacity, or read timeout.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_record_len == 0 {
            return Err(ConfigError::Zero {
                field: "max_record_len",
            });
        }
        if self.event_queue_capacity == 0 {
            return Err(ConfigError::Zero {
                field: "event_queue_capacity",
            });
        }
        if self.read_timeout.is_zero() {
            return Err(ConfigError::Zero {
                field: "read_timeout",
            });
        }
        Ok(())
    }
}

impl Default for BridgeConfig {
    /// | Field                 | Default         |
    /// |-----------------------|-----------------|
    /// | bind_addr             | `0.0.0.0:8080`  |
    /// | max_record_len        | 65536           |
    /// | event_queue_capacity  | 256             |
    /// | read_timeout          | 50 ms           |
    /// | log_level             | `info`          |
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_PORT),
            max_record_len: DEFAULT_MAX_RECORD_LEN,
            event_queue_capacity: DEFAULT_EVENT_QUEUE_CAPACITY,
            read_timeout: DEFAULT_READ_TIMEOUT,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
