//! Optional TOML configuration file.
//!
//! Passing `--config <path>` loads settings from a file like this:
//!
//! ```toml
//! [bridge]
//! bind = "127.0.0.1"
//! port = 9000
//! max_record_len = 4096
//! event_queue_capacity = 128
//! read_timeout_ms = 20
//! log_level = "debug"
//! ```
//!
//! # Serde default values
//!
//! Every key is optional.  Fields annotated with `#[serde(default = "...")]`
//! take the built-in default when they are absent, so an empty file (or one
//! without a `[bridge]` table) yields [`BridgeConfig::default`].  CLI flags
//! and environment variables are applied on top of the result in `main.rs`.

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use serial_bridge_core::DEFAULT_MAX_RECORD_LEN;

use crate::domain::config::{
    BridgeConfig, ConfigError, DEFAULT_EVENT_QUEUE_CAPACITY, DEFAULT_LOG_LEVEL, DEFAULT_PORT,
    DEFAULT_READ_TIMEOUT,
};

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigFileError {
    /// The file could not be read.
    #[error("I/O error reading config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The file parsed but holds an unusable value.
    #[error("invalid config value: {0}")]
    Invalid(#[from] ConfigError),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level layout of the config file.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ConfigFile {
    #[serde(default)]
    pub bridge: BridgeSection,
}

/// The `[bridge]` table.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct BridgeSection {
    /// IP address to listen on.  `"0.0.0.0"` binds all interfaces.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// WebSocket listener port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Maximum undelimited bytes buffered per device.
    #[serde(default = "default_max_record_len")]
    pub max_record_len: usize,
    /// Capacity of each session's device event queue.
    #[serde(default = "default_event_queue_capacity")]
    pub event_queue_capacity: usize,
    /// Serial read timeout in milliseconds.
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    /// `tracing` log level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_bind() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_max_record_len() -> usize {
    DEFAULT_MAX_RECORD_LEN
}
fn default_event_queue_capacity() -> usize {
    DEFAULT_EVENT_QUEUE_CAPACITY
}
fn default_read_timeout_ms() -> u64 {
    DEFAULT_READ_TIMEOUT.as_millis() as u64
}
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

impl Default for BridgeSection {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            max_record_len: default_max_record_len(),
            event_queue_capacity: default_event_queue_capacity(),
            read_timeout_ms: default_read_timeout_ms(),
            log_level: default_log_level(),
        }
    }
}

impl BridgeSection {
    /// Converts the table into a validated [`BridgeConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidAddress`] if `bind` is not an IP address,
    /// or [`ConfigError::Zero`] for a zero-valued limit.
    pub fn to_bridge_config(&self) -> Result<BridgeConfig, ConfigError> {
        let ip: IpAddr = self
            .bind
            .parse()
            .map_err(|_| ConfigError::InvalidAddress(self.bind.clone()))?;

        let config = BridgeConfig {
            bind_addr: SocketAddr::new(ip, self.port),
            max_record_len: self.max_record_len,
            event_queue_capacity: self.event_queue_capacity,
            read_timeout: Duration::from_millis(self.read_timeout_ms),
            log_level: self.log_level.clone(),
        };
        config.validate()?;
        Ok(config)
    }
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// Parses config file text.
///
/// # Errors
///
/// Returns [`ConfigFileError::Parse`] for malformed TOML or wrongly typed
/// values.
pub fn parse_config(text: &str) -> Result<ConfigFile, ConfigFileError> {
    Ok(toml::from_str(text)?)
}

/// Reads and parses the config file at `path` into a [`BridgeConfig`].
///
/// # Errors
///
/// Returns [`ConfigFileError::Io`] if the file cannot be read, and the
/// errors of [`parse_config`] and [`BridgeSection::to_bridge_config`].
pub fn load_config(path: &Path) -> Result<BridgeConfig, ConfigFileError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigFileError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let file = parse_config(&text)?;
    Ok(file.bridge.to_bridge_config()?)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_file_yields_defaults() {
        let file = parse_config("").unwrap();
        assert_eq!(
            file.bridge.to_bridge_config().unwrap(),
            BridgeConfig::default()
        );
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        // Arrange
        let text = "[bridge]\nport = 9000\nlog_level = \"debug\"\n";

        // Act
        let config = parse_config(text).unwrap().bridge.to_bridge_config().unwrap();

        // Assert
        assert_eq!(config.bind_addr, "0.0.0.0:9000".parse().unwrap());
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.max_record_len, DEFAULT_MAX_RECORD_LEN);
        assert_eq!(config.read_timeout, DEFAULT_READ_TIMEOUT);
    }

    #[test]
    fn test_full_section() {
        let text = r#"
            [bridge]
            bind = "127.0.0.1"
            port = 9001
            max_record_len = 4096
            event_queue_capacity = 8
            read_timeout_ms = 20
            log_level = "trace"
        "#;

        let config = parse_config(text).unwrap().bridge.to_bridge_config().unwrap();

        assert_eq!(config.bind_addr, "127.0.0.1:9001".parse().unwrap());
        assert_eq!(config.max_record_len, 4096);
        assert_eq!(config.event_queue_capacity, 8);
        assert_eq!(config.read_timeout, Duration::from_millis(20));
        assert_eq!(config.log_level, "trace");
    }

    #[test]
    fn test_wrong_type_is_parse_error() {
        let result = parse_config("[bridge]\nport = \"eighty\"\n");
        assert!(matches!(result, Err(ConfigFileError::Parse(_))));
    }

    #[test]
    fn test_bad_bind_address_is_rejected() {
        let file = parse_config("[bridge]\nbind = \"not-an-ip\"\n").unwrap();
        assert_eq!(
            file.bridge.to_bridge_config(),
            Err(ConfigError::InvalidAddress("not-an-ip".to_string()))
        );
    }

    #[test]
    fn test_load_config_from_disk() {
        // Arrange
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[bridge]\nport = 9100").unwrap();

        // Act
        let config = load_config(file.path()).unwrap();

        // Assert
        assert_eq!(config.bind_addr.port(), 9100);
    }

    #[test]
    fn test_load_config_rejects_zero_queue() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[bridge]\nevent_queue_capacity = 0").unwrap();

        let err = load_config(file.path()).unwrap_err();

        assert!(matches!(err, ConfigFileError::Invalid(ConfigError::Zero { .. })));
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");

        let err = load_config(&path).unwrap_err();

        match err {
            ConfigFileError::Io { path: p, .. } => assert_eq!(p, path),
            other => panic!("expected Io error, got {other:?}"),
        }
    }
}
