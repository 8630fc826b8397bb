//! serial-bridge library crate.
//!
//! This crate exposes the serial ports attached to a host over a WebSocket
//! endpoint, so that a web page can list ports, open one, send lines to it and
//! receive the lines it prints.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! Web client (JSON over WebSocket)
//!         ↕
//! [serial-bridge]
//!   ├── domain/              Pure types: BridgeConfig
//!   ├── application/         Session state machine + driver seam
//!   └── infrastructure/
//!         ├── ws_server/     WebSocket accept loop (tokio-tungstenite)
//!         ├── serial_driver/ Serial ports (serialport)
//!         └── config_file/   Optional TOML config
//!         ↕
//! Serial devices (newline-delimited text)
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O and no async.
//! - `application` depends on `domain` and `serial-bridge-core`; it reaches
//!   devices only through the [`application::SerialDriver`] trait.
//! - `infrastructure` depends on all other layers plus `tokio`,
//!   `tungstenite` and `serialport`.
//!
//! # For beginners: why this structure?
//!
//! The session logic (what happens on `connect`, how bytes become lines) is
//! tested against fake drivers without any hardware.  Only the thin
//! infrastructure layer needs a real port or socket.

/// Domain layer: pure configuration types (no I/O).
pub mod domain;

/// Application layer: per-client session logic.
pub mod application;

/// Infrastructure layer: WebSocket server, serial driver, config file.
pub mod infrastructure;
