//! Application layer for serial-bridge.
//!
//! The application layer knows *what* to do with client requests and device
//! events, but delegates *how* bytes reach a port or a socket to the
//! infrastructure layer through the traits in [`device`].
//!
//! # Responsibilities
//!
//! - The per-client [`Session`] state machine (`Idle` / `Open`)
//! - The driver seam: [`SerialDriver`], [`DeviceHandle`], [`DeviceEventSink`]
//!
//! # What does NOT belong here?
//!
//! - Opening sockets or serial ports (that is infrastructure)
//! - Tokio task spawning (that happens in the infrastructure layer)
//! - WebSocket framing (handled by tokio-tungstenite)

pub mod device;
pub mod session;

pub use device::{
    DeviceEvent, DeviceEventKind, DeviceEventSink, DeviceHandle, DriverError, SerialDriver,
    TrySendError,
};
pub use session::{Session, SessionState, NOT_CONNECTED};
