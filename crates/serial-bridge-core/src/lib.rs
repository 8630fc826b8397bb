//! # serial-bridge-core
//!
//! Shared library for the serial bridge containing the line framer and the
//! JSON control protocol spoken between remote clients and the gateway.
//!
//! This crate has zero dependencies on OS APIs, serial drivers, or network
//! sockets.  Everything in it is deterministic and can be tested with
//! synthetic byte chunks and strings.
//!
//! # Architecture overview
//!
//! The serial bridge lets a remote client observe and control a hardware
//! device attached to a serial port.  The device speaks an unframed byte
//! stream; the client speaks discrete JSON messages.  This crate holds the
//! two pieces that sit on either side of that gap:
//!
//! - **`framing`** – Turns raw byte chunks read from the serial line into
//!   complete newline-delimited records.
//!
//! - **`protocol`** – The tagged JSON envelopes (`list-ports`, `connect`,
//!   `data-received`, …) and the codec that converts them to and from text.

pub mod framing;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `serial_bridge_core::LineFramer` instead of the full module path.
pub use framing::line::{Framed, LineFramer, DEFAULT_MAX_RECORD_LEN};
pub use protocol::codec::{decode_request, encode_event, CodecError};
pub use protocol::messages::{BaudRate, ClientRequest, GatewayEvent, PortInfo};
