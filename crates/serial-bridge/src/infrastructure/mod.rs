//! Infrastructure layer for serial-bridge.
//!
//! The infrastructure layer handles all I/O: accepting WebSocket connections
//! from clients, talking to the host's serial ports, and reading the optional
//! config file.
//!
//! # Responsibilities
//!
//! - Binding a TCP listener and performing the WebSocket upgrade handshake
//! - Spawning and reaping per-session Tokio tasks
//! - Enumerating, opening, reading and writing serial ports (`serialport`)
//! - Handling the graceful shutdown signal
//!
//! # What does NOT belong here?
//!
//! - Session state transitions (that is the application layer)
//! - Message type definitions (that is `serial-bridge-core`)

pub mod config_file;
pub mod serial_driver;
pub mod ws_server;

// Re-export the primary entry points so `main.rs` can call them concisely.
pub use config_file::{load_config, ConfigFileError};
pub use serial_driver::SystemSerialDriver;
pub use ws_server::Gateway;
