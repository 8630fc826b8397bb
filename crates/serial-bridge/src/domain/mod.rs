//! Domain layer for serial-bridge.
//!
//! The domain layer contains pure types that have no dependencies on I/O,
//! networking, or serial drivers.
//!
//! # What belongs in the domain layer?
//!
//! - Configuration structures and their validation
//! - The protocol vocabulary (re-exported from `serial-bridge-core`)
//!
//! # What does NOT belong here?
//!
//! - Any `tokio`, `TcpStream`, `WebSocket`, or `SerialPort` types
//! - File I/O or environment variable reading

pub mod config;

pub use config::{BridgeConfig, ConfigError};
pub use serial_bridge_core::{BaudRate, ClientRequest, GatewayEvent, PortInfo};
