//! The seam between a session and the serial driver.
//!
//! The session never touches `serialport` directly.  It talks to two traits:
//!
//! - [`SerialDriver`] enumerates ports and opens devices.
//! - [`DeviceHandle`] is one open device: write bytes, close it.
//!
//! Everything the device says back (byte chunks, runtime errors, loss of the
//! device) arrives asynchronously on the session's single event queue through
//! a [`DeviceEventSink`].  Each sink is stamped with a *generation* number so
//! the session can tell events from the device it currently holds apart from
//! stragglers sent by a device it has already closed.
//!
//! ```text
//!             open(path, baud, sink#7)
//!   Session ─────────────────────────────▶ SerialDriver
//!      ▲                                        │
//!      │  DeviceEvent { generation: 7, .. }     │ reader thread
//!      └──────────── mpsc queue ◀───────────────┘
//! ```
//!
//! Infrastructure provides the real implementation; tests provide recording
//! fakes.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use serial_bridge_core::{BaudRate, PortInfo};

// ── Errors ────────────────────────────────────────────────────────────────────

/// Failures reported by the serial driver collaborator.
///
/// The `Display` text of each variant is what the client sees in the
/// `error` event's `message` field.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DriverError {
    /// Listing the attached devices failed.
    #[error("failed to enumerate ports: {0}")]
    Enumeration(String),

    /// The device at `path` could not be opened.
    #[error("failed to open {path}: {message}")]
    Open {
        /// Path that was requested.
        path: String,
        /// Driver-supplied reason.
        message: String,
    },

    /// A write could not be queued or performed.
    #[error("write failed: {0}")]
    Write(String),

    /// The handle has already been closed.
    #[error("port is closed")]
    Closed,
}

// ── Device events ─────────────────────────────────────────────────────────────

/// What an open device reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEventKind {
    /// A chunk of raw bytes read from the line.  No framing has been applied.
    Data(Vec<u8>),

    /// A runtime error the device survived (e.g. a failed write).  The device
    /// stays open.
    Error(String),

    /// The device is gone: end of stream, unplugged, or a fatal read error.
    /// No further events follow from this generation.
    Lost(String),
}

/// A [`DeviceEventKind`] tagged with the generation of the device that sent it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceEvent {
    /// Generation of the [`DeviceEventSink`] that produced the event.
    pub generation: u64,
    /// The payload.
    pub kind: DeviceEventKind,
}

/// Why [`DeviceEventSink::try_send`] did not queue an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrySendError {
    /// The queue is full; the event is handed back for a retry.
    Full(DeviceEventKind),
    /// The session has been dropped.
    Closed,
}

/// Sending side of a session's device event queue, bound to one device.
///
/// Cloneable so the driver can hand copies to a reader and a writer thread.
#[derive(Debug, Clone)]
pub struct DeviceEventSink {
    generation: u64,
    tx: mpsc::Sender<DeviceEvent>,
}

impl DeviceEventSink {
    /// Creates a sink that stamps every event with `generation`.
    pub fn new(generation: u64, tx: mpsc::Sender<DeviceEvent>) -> Self {
        Self { generation, tx }
    }

    /// Returns the generation this sink stamps on its events.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Queues an event from async code.
    ///
    /// Returns `false` once the session has gone away; the caller should stop
    /// producing events.
    pub async fn send(&self, kind: DeviceEventKind) -> bool {
        self.tx.send(self.stamp(kind)).await.is_ok()
    }

    /// Queues an event without waiting.
    ///
    /// Used from plain OS threads, which must be able to give up on a full
    /// queue when their device is being closed.
    ///
    /// # Errors
    ///
    /// Returns [`Full`](TrySendError::Full) with the event handed back when
    /// the queue is at capacity, or [`Closed`](TrySendError::Closed) once the
    /// session has gone away.
    pub fn try_send(&self, kind: DeviceEventKind) -> Result<(), TrySendError> {
        self.tx.try_send(self.stamp(kind)).map_err(|e| match e {
            mpsc::error::TrySendError::Full(event) => TrySendError::Full(event.kind),
            mpsc::error::TrySendError::Closed(_) => TrySendError::Closed,
        })
    }

    /// Returns `true` once the receiving session has been dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    fn stamp(&self, kind: DeviceEventKind) -> DeviceEvent {
        DeviceEvent {
            generation: self.generation,
            kind,
        }
    }
}

// ── Driver traits ─────────────────────────────────────────────────────────────

/// Enumerates and opens serial devices.
///
/// Shared by every session, so implementations must be `Send + Sync` and keep
/// no per-session state.
#[async_trait]
pub trait SerialDriver: Send + Sync {
    /// Lists the serial devices currently attached to the host.
    async fn list_ports(&self) -> Result<Vec<PortInfo>, DriverError>;

    /// Opens `path` at `baud_rate`.
    ///
    /// On success the device starts pushing [`DeviceEvent`]s into `events`
    /// until it is closed or lost.
    async fn open(
        &self,
        path: &str,
        baud_rate: BaudRate,
        events: DeviceEventSink,
    ) -> Result<Box<dyn DeviceHandle>, DriverError>;
}

/// One open serial connection, exclusively owned by a session.
pub trait DeviceHandle: Send {
    /// Hands `bytes` to the device for writing.
    ///
    /// Does not wait for the bytes to reach the wire.  A failure that happens
    /// later is reported as [`DeviceEventKind::Error`].
    fn write(&mut self, bytes: &[u8]) -> Result<(), DriverError>;

    /// Closes the device and stops its event production.  Idempotent.
    fn close(&mut self);
}

// ── Tests ─────────────────────────────────────────────────────────────────────
