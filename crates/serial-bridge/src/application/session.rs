//! The per-client session state machine.
//!
//! One [`Session`] exists per accepted client connection.  It owns at most one
//! open device, the [`LineFramer`] scoped to that device, and the sending side
//! of the session's device event queue.
//!
//! # States
//!
//! ```text
//!            connect ok                      disconnect / device lost
//!   ┌──────┐ ───────────▶ ┌──────┐ ──────────────────────────────▶ ┌──────┐
//!   │ Idle │              │ Open │                                  │ Idle │
//!   └──────┘ ◀─────────── └──────┘                                  └──────┘
//!            connect failed (old device already released)
//! ```
//!
//! The session is driven from exactly one task, which alternates between
//! client requests ([`Session::handle_text`]) and device events
//! ([`Session::handle_device_event`]).  Every method takes `&mut self`, so
//! each transition is atomic with respect to both sources.  Methods return
//! the events to send to the client instead of sending them, which keeps the
//! state machine testable without a socket.
//!
//! # Stale device events
//!
//! Closing a device does not retract events its reader thread has already
//! queued.  Every device gets a fresh generation number and every release
//! bumps it again, so anything still in flight from a previous device is
//! recognised by its generation and dropped.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use serial_bridge_core::{
    decode_request, BaudRate, ClientRequest, Framed, GatewayEvent, LineFramer,
};

use crate::application::device::{
    DeviceEvent, DeviceEventKind, DeviceEventSink, DeviceHandle, SerialDriver,
};

/// Message sent when a client writes while no device is open.
pub const NOT_CONNECTED: &str = "Port not connected";

/// Whether the session currently holds a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No device held.
    Idle,
    /// A device is held and presumed usable.
    Open,
}

/// Per-client state: at most one device plus its framing state.
pub struct Session {
    id: Uuid,
    driver: Arc<dyn SerialDriver>,
    device: Option<Box<dyn DeviceHandle>>,
    port_path: Option<String>,
    baud_rate: Option<BaudRate>,
    framer: LineFramer,
    /// Generation of the currently held device.  Bumped on every acquire and
    /// every release.
    generation: u64,
    events_tx: mpsc::Sender<DeviceEvent>,
}

impl Session {
    /// Creates an idle session.
    ///
    /// `events_tx` is the sending side of the queue the session task drains;
    /// every device this session opens reports into it.
    pub fn new(
        driver: Arc<dyn SerialDriver>,
        max_record_len: usize,
        events_tx: mpsc::Sender<DeviceEvent>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            driver,
            device: None,
            port_path: None,
            baud_rate: None,
            framer: LineFramer::with_max_record_len(max_record_len),
            generation: 0,
            events_tx,
        }
    }

    /// Unique id used in log lines.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        if self.device.is_some() {
            SessionState::Open
        } else {
            SessionState::Idle
        }
    }

    /// Path of the open device, if any.
    pub fn port_path(&self) -> Option<&str> {
        self.port_path.as_deref()
    }

    /// Baud rate of the open device, if any.
    pub fn baud_rate(&self) -> Option<BaudRate> {
        self.baud_rate
    }

    /// Bytes from the open device still waiting for a delimiter.
    pub fn buffered(&self) -> &[u8] {
        self.framer.buffered()
    }

    // ── Client requests ───────────────────────────────────────────────────────

    /// Decodes one client text frame and applies it.
    ///
    /// Malformed text yields a single `error` event and leaves the state
    /// untouched.
    pub async fn handle_text(&mut self, text: &str) -> Vec<GatewayEvent> {
        match decode_request(text) {
            Ok(request) => self.handle_request(request).await,
            Err(e) => {
                warn!("session {}: {e}", self.id);
                vec![GatewayEvent::error(e.to_string())]
            }
        }
    }

    /// Applies one decoded client request.
    pub async fn handle_request(&mut self, request: ClientRequest) -> Vec<GatewayEvent> {
        debug!("session {}: request {}", self.id, request.kind());

        match request {
            ClientRequest::ListPorts => vec![self.list_ports().await],
            ClientRequest::Connect { port, baud_rate } => vec![self.connect(port, baud_rate).await],
            ClientRequest::SendData { data } => self.send_data(&data).into_iter().collect(),
            ClientRequest::Disconnect => self.disconnect().into_iter().collect(),
        }
    }

    // `&mut self` keeps the future `Send`: `Session` is not `Sync`.
    async fn list_ports(&mut self) -> GatewayEvent {
        match self.driver.list_ports().await {
            Ok(ports) => {
                debug!("session {}: {} port(s) found", self.id, ports.len());
                GatewayEvent::PortsList { ports }
            }
            Err(e) => {
                warn!("session {}: {e}", self.id);
                GatewayEvent::error(e.to_string())
            }
        }
    }

    async fn connect(&mut self, port: String, baud_rate: BaudRate) -> GatewayEvent {
        // The old device must be gone before the new one is opened, even if
        // the open then fails.
        if self.release_device() {
            debug!("session {}: released previous device before connect", self.id);
        }

        self.generation += 1;
        let sink = DeviceEventSink::new(self.generation, self.events_tx.clone());

        match self.driver.open(&port, baud_rate, sink).await {
            Ok(device) => {
                info!("session {}: opened {port} at {baud_rate} baud", self.id);
                self.framer.reset();
                self.device = Some(device);
                self.port_path = Some(port.clone());
                self.baud_rate = Some(baud_rate);
                GatewayEvent::Connected { port, baud_rate }
            }
            Err(e) => {
                warn!("session {}: {e}", self.id);
                GatewayEvent::error(e.to_string())
            }
        }
    }

    fn send_data(&mut self, data: &str) -> Option<GatewayEvent> {
        let Some(device) = self.device.as_mut() else {
            return Some(GatewayEvent::error(NOT_CONNECTED));
        };

        let mut bytes = Vec::with_capacity(data.len() + 1);
        bytes.extend_from_slice(data.as_bytes());
        bytes.push(serial_bridge_core::framing::line::DELIMITER);

        match device.write(&bytes) {
            Ok(()) => {
                debug!("session {}: queued {} byte(s) for write", self.id, bytes.len());
                None
            }
            Err(e) => {
                warn!("session {}: {e}", self.id);
                Some(GatewayEvent::error(e.to_string()))
            }
        }
    }

    fn disconnect(&mut self) -> Option<GatewayEvent> {
        // Disconnecting an idle session is a silent no-op.
        self.release_device().then_some(GatewayEvent::Disconnected)
    }

    // ── Device events ─────────────────────────────────────────────────────────

    /// Applies one event from the device queue.
    ///
    /// Events from a device this session no longer holds are discarded.
    pub fn handle_device_event(&mut self, event: DeviceEvent) -> Vec<GatewayEvent> {
        if self.device.is_none() || event.generation != self.generation {
            debug!(
                "session {}: discarding stale device event (generation {} != {})",
                self.id, event.generation, self.generation
            );
            return Vec::new();
        }

        match event.kind {
            DeviceEventKind::Data(chunk) => {
                let cap = self.framer.max_record_len();
                self.framer
                    .feed(&chunk)
                    .into_iter()
                    .map(|item| match item {
                        Framed::Record(record) => GatewayEvent::DataReceived {
                            data: String::from_utf8_lossy(&record).into_owned(),
                        },
                        Framed::Overflow => {
                            warn!("session {}: record longer than {cap} bytes dropped", self.id);
                            GatewayEvent::error(format!(
                                "Record exceeded {cap} bytes and was discarded"
                            ))
                        }
                    })
                    .collect()
            }
            DeviceEventKind::Error(message) => {
                // A runtime error does not invalidate the device.
                warn!("session {}: device error: {message}", self.id);
                vec![GatewayEvent::error(message)]
            }
            DeviceEventKind::Lost(message) => {
                warn!("session {}: device lost: {message}", self.id);
                self.release_device();
                vec![GatewayEvent::error(message), GatewayEvent::Disconnected]
            }
        }
    }

    // ── Teardown ──────────────────────────────────────────────────────────────

    /// Releases the device, if any.  Idempotent.
    ///
    /// Called when the client channel closes; also runs on drop.
    pub fn close(&mut self) {
        if self.release_device() {
            info!("session {}: device released on session close", self.id);
        }
    }

    /// Closes and forgets the held device.  Returns `false` if there was none.
    fn release_device(&mut self) -> bool {
        let Some(mut device) = self.device.take() else {
            return false;
        };

        device.close();
        self.framer.reset();
        self.generation += 1;

        if let Some(path) = self.port_path.take() {
            info!("session {}: closed {path}", self.id);
        }
        self.baud_rate = None;
        true
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
