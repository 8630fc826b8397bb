//! `serialport`-backed implementation of [`SerialDriver`].
//!
//! # Threading model
//!
//! The `serialport` crate exposes blocking I/O.  Each open device therefore
//! gets two plain OS threads:
//!
//! - a **reader** that polls the port with a short timeout and pushes byte
//!   chunks into the session's event queue, and
//! - a **writer** that drains a channel of outgoing buffers, so that
//!   [`DeviceHandle::write`] returns immediately.
//!
//! Closing the handle sets a shared cancel flag, drops the writer's channel
//! and joins both threads.  The reader notices the flag within one read
//! timeout, so `close()` blocks for at most that long and returns only after
//! every clone of the port, and with it the OS handle, has been dropped.  A
//! reopen of the same path right after `close()` therefore never races the
//! old handle for exclusive access.
//!
//! The threads never block on a full event queue: the session that drains it
//! may itself be waiting in `close()`.  They retry while the device is open
//! and give up once it is cancelled.
//!
//! Enumeration and `open()` run on tokio's blocking pool.

use std::io::{ErrorKind, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc as std_mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use async_trait::async_trait;
use serialport::{SerialPort, SerialPortType};
use tracing::{debug, error, info, warn};

use serial_bridge_core::{BaudRate, PortInfo};

use crate::application::device::{
    DeviceEventKind, DeviceEventSink, DeviceHandle, DriverError, SerialDriver, TrySendError,
};

/// Size of the buffer handed to each `read()` call.
const READ_CHUNK: usize = 1024;

/// Pause between attempts to queue an event while the session's queue is full.
const QUEUE_RETRY: Duration = Duration::from_millis(2);

// ── Driver ────────────────────────────────────────────────────────────────────

/// Talks to the host's real serial ports.
#[derive(Debug, Clone)]
pub struct SystemSerialDriver {
    read_timeout: Duration,
}

impl SystemSerialDriver {
    /// Creates a driver whose devices poll with `read_timeout`.
    pub fn new(read_timeout: Duration) -> Self {
        Self { read_timeout }
    }
}

#[async_trait]
impl SerialDriver for SystemSerialDriver {
    async fn list_ports(&self) -> Result<Vec<PortInfo>, DriverError> {
        let ports = tokio::task::spawn_blocking(serialport::available_ports)
            .await
            .map_err(|e| DriverError::Enumeration(e.to_string()))?
            .map_err(|e| DriverError::Enumeration(e.to_string()))?;

        Ok(ports
            .into_iter()
            .map(|p| match p.port_type {
                SerialPortType::UsbPort(usb) => {
                    usb_port_info(p.port_name, usb.vid, usb.pid, usb.manufacturer)
                }
                _ => PortInfo::new(p.port_name),
            })
            .collect())
    }

    async fn open(
        &self,
        path: &str,
        baud_rate: BaudRate,
        events: DeviceEventSink,
    ) -> Result<Box<dyn DeviceHandle>, DriverError> {
        let open_error = |message: String| DriverError::Open {
            path: path.to_string(),
            message,
        };

        let builder = serialport::new(path, baud_rate.get()).timeout(self.read_timeout);
        let port = tokio::task::spawn_blocking(move || builder.open())
            .await
            .map_err(|e| open_error(e.to_string()))?
            .map_err(|e| open_error(e.to_string()))?;

        let device = SerialDevice::start(path, port, events).map_err(open_error)?;
        info!("opened serial port {path} at {baud_rate} baud");
        Ok(Box::new(device))
    }
}

/// Builds the wire description of a USB serial adapter.
///
/// Ids are rendered as 4-digit lowercase hex (`0x1a86` → `"1a86"`), the form
/// most dashboards already match against.
pub fn usb_port_info(
    path: String,
    vid: u16,
    pid: u16,
    manufacturer: Option<String>,
) -> PortInfo {
    PortInfo {
        path,
        manufacturer,
        product_id: Some(format!("{pid:04x}")),
        vendor_id: Some(format!("{vid:04x}")),
    }
}

// ── Device ────────────────────────────────────────────────────────────────────

/// One open serial port with its reader and writer threads.
pub struct SerialDevice {
    path: String,
    /// `None` once closed.
    writer: Option<std_mpsc::Sender<Vec<u8>>>,
    cancel: Arc<AtomicBool>,
    /// Reader and writer threads; joined by `close()`.
    workers: Vec<JoinHandle<()>>,
}

impl SerialDevice {
    /// Spawns the reader and writer threads for `port`.
    ///
    /// Returns a plain message on failure so the caller can wrap it in
    /// [`DriverError::Open`].
    fn start(
        path: &str,
        port: Box<dyn SerialPort>,
        events: DeviceEventSink,
    ) -> Result<Self, String> {
        let reader_port = port
            .try_clone()
            .map_err(|e| format!("failed to clone port handle: {e}"))?;
        let cancel = Arc::new(AtomicBool::new(false));
        let (writer_tx, writer_rx) = std_mpsc::channel::<Vec<u8>>();

        let reader_events = events.clone();
        let reader_cancel = Arc::clone(&cancel);
        let reader_path = path.to_string();
        let reader = thread::Builder::new()
            .name(format!("serial-read {path}"))
            .spawn(move || read_loop(reader_port, &reader_path, reader_events, reader_cancel))
            .map_err(|e| format!("failed to spawn reader thread: {e}"))?;

        let writer_cancel = Arc::clone(&cancel);
        let writer_path = path.to_string();
        let spawned = thread::Builder::new()
            .name(format!("serial-write {path}"))
            .spawn(move || write_loop(port, &writer_path, writer_rx, events, writer_cancel));
        let writer = match spawned {
            Ok(writer) => writer,
            Err(e) => {
                // The reader is already running; stop it before bailing out.
                cancel.store(true, Ordering::SeqCst);
                let _ = reader.join();
                return Err(format!("failed to spawn writer thread: {e}"));
            }
        };

        Ok(Self {
            path: path.to_string(),
            writer: Some(writer_tx),
            cancel,
            workers: vec![reader, writer],
        })
    }
}

impl DeviceHandle for SerialDevice {
    fn write(&mut self, bytes: &[u8]) -> Result<(), DriverError> {
        let writer = self.writer.as_ref().ok_or(DriverError::Closed)?;
        writer
            .send(bytes.to_vec())
            .map_err(|_| DriverError::Write("writer thread has stopped".to_string()))
    }

    fn close(&mut self) {
        // Raise the flag before the writer's channel closes, so a buffer still
        // queued behind it is never written.
        self.cancel.store(true, Ordering::SeqCst);
        let was_open = self.writer.take().is_some();

        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                error!("{}: serial worker thread panicked", self.path);
            }
        }

        if was_open {
            info!("closed serial port {}", self.path);
        }
    }
}

impl Drop for SerialDevice {
    fn drop(&mut self) {
        self.close();
    }
}

// ── Worker threads ────────────────────────────────────────────────────────────

/// Queues `kind` for the session, retrying while its queue is full.
///
/// Returns `false` if the device was cancelled or the session is gone; the
/// calling thread should then stop.
fn forward(events: &DeviceEventSink, mut kind: DeviceEventKind, cancel: &AtomicBool) -> bool {
    loop {
        if cancel.load(Ordering::SeqCst) {
            return false;
        }
        match events.try_send(kind) {
            Ok(()) => return true,
            Err(TrySendError::Full(returned)) => {
                kind = returned;
                thread::sleep(QUEUE_RETRY);
            }
            Err(TrySendError::Closed) => return false,
        }
    }
}

fn read_loop(
    mut port: Box<dyn SerialPort>,
    path: &str,
    events: DeviceEventSink,
    cancel: Arc<AtomicBool>,
) {
    let mut buf = vec![0u8; READ_CHUNK];

    while !cancel.load(Ordering::SeqCst) && !events.is_closed() {
        match port.read(&mut buf) {
            Ok(0) => {
                forward(
                    &events,
                    DeviceEventKind::Lost(format!("{path}: device disconnected")),
                    &cancel,
                );
                break;
            }
            Ok(n) => {
                debug!("{path}: read {n} byte(s)");
                if !forward(&events, DeviceEventKind::Data(buf[..n].to_vec()), &cancel) {
                    break;
                }
            }
            Err(ref e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::Interrupted) => {}
            Err(e) => {
                if !cancel.load(Ordering::SeqCst) {
                    warn!("{path}: read failed: {e}");
                }
                forward(
                    &events,
                    DeviceEventKind::Lost(format!("{path}: read failed: {e}")),
                    &cancel,
                );
                break;
            }
        }
    }

    debug!(
        "{path}: reader thread exiting (generation {})",
        events.generation()
    );
}

fn write_loop(
    mut port: Box<dyn SerialPort>,
    path: &str,
    outgoing: std_mpsc::Receiver<Vec<u8>>,
    events: DeviceEventSink,
    cancel: Arc<AtomicBool>,
) {
    // Ends when the handle is closed and its sender dropped.
    for bytes in outgoing {
        if cancel.load(Ordering::SeqCst) {
            break;
        }
        if let Err(e) = port.write_all(&bytes).and_then(|()| port.flush()) {
            warn!("{path}: serial write failed: {e}");
            if !forward(&events, DeviceEventKind::Error(format!("write failed: {e}")), &cancel) {
                break;
            }
        }
    }

    debug!(
        "{path}: writer thread exiting (generation {})",
        events.generation()
    );
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usb_port_info_formats_ids_as_lowercase_hex() {
        let info = usb_port_info(
            "/dev/ttyUSB0".to_string(),
            0x1A86,
            0x7523,
            Some("QinHeng Electronics".to_string()),
        );

        assert_eq!(info.vendor_id.as_deref(), Some("1a86"));
        assert_eq!(info.product_id.as_deref(), Some("7523"));
        assert_eq!(info.manufacturer.as_deref(), Some("QinHeng Electronics"));
    }

    #[test]
    fn test_usb_port_info_pads_short_ids() {
        let info = usb_port_info("COM3".to_string(), 0x0403, 0x0001, None);

        assert_eq!(info.vendor_id.as_deref(), Some("0403"));
        assert_eq!(info.product_id.as_deref(), Some("0001"));
        assert_eq!(info.manufacturer, None);
    }

    #[tokio::test]
    async fn test_open_missing_port_reports_open_failure() {
        // Arrange
        let driver = SystemSerialDriver::new(Duration::from_millis(10));
        let (tx, _rx) = tokio::sync::mpsc::channel(4);
        let sink = DeviceEventSink::new(1, tx);
        let path = "/definitely/not/a/serial/port";

        // Act
        let result = driver
            .open(path, BaudRate::new(9600).unwrap(), sink)
            .await;

        // Assert
        match result {
            Err(DriverError::Open { path: p, .. }) => assert_eq!(p, path),
            Err(other) => panic!("expected Open error, got {other:?}"),
            Ok(_) => panic!("opening a nonexistent path must fail"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_close_releases_port_so_same_path_reopens() {
        // Arrange: the slave end of a pty stands in for a serial device; the
        // master end is kept open so the slave stays alive.
        let (_master, slave) = serialport::TTYPort::pair().unwrap();
        let path = slave.name().unwrap();
        drop(slave);
        let driver = SystemSerialDriver::new(Duration::from_millis(10));
        let baud = BaudRate::new(9600).unwrap();
        let (tx, mut rx) = tokio::sync::mpsc::channel(4);
        let mut first = driver
            .open(&path, baud, DeviceEventSink::new(1, tx))
            .await
            .unwrap();

        // Act
        first.close();

        // Assert: both worker threads, and their sink clones, are gone
        assert!(matches!(
            rx.try_recv(),
            Err(tokio::sync::mpsc::error::TryRecvError::Disconnected)
        ));

        // ...so the same path opens again immediately, at a new baud rate
        let (tx, _rx) = tokio::sync::mpsc::channel(4);
        let mut second = driver
            .open(&path, BaudRate::new(115_200).unwrap(), DeviceEventSink::new(2, tx))
            .await
            .unwrap();
        assert!(matches!(first.write(b"late\n"), Err(DriverError::Closed)));
        second.close();
    }

    #[test]
    fn test_forward_gives_up_on_full_queue_once_cancelled() {
        // Arrange: a full queue nobody drains
        let (tx, _rx) = tokio::sync::mpsc::channel(1);
        let sink = DeviceEventSink::new(1, tx);
        assert_eq!(sink.try_send(DeviceEventKind::Data(b"a".to_vec())), Ok(()));
        let cancel = Arc::new(AtomicBool::new(false));

        // Act: cancel from another thread while forward() is retrying
        let flag = Arc::clone(&cancel);
        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            flag.store(true, Ordering::SeqCst);
        });
        let delivered = forward(&sink, DeviceEventKind::Data(b"b".to_vec()), &cancel);
        canceller.join().unwrap();

        // Assert
        assert!(!delivered);
    }

    #[test]
    fn test_forward_stops_when_session_is_gone() {
        let (tx, rx) = tokio::sync::mpsc::channel(1);
        let sink = DeviceEventSink::new(1, tx);
        drop(rx);

        let cancel = AtomicBool::new(false);
        assert!(!forward(&sink, DeviceEventKind::Error("x".into()), &cancel));
    }
}
