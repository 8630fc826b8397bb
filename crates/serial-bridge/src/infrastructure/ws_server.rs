//! WebSocket server: accept loop and per-session task management.
//!
//! This module is responsible for:
//!
//! 1. Binding a TCP listener on the configured address.
//! 2. Accepting incoming TCP connections from clients.
//! 3. Upgrading each connection to a WebSocket session.
//! 4. Running one Tokio task per session that multiplexes two inputs with
//!    `tokio::select!`:
//!    - **Client → Device**: JSON text frames decoded into requests and
//!      applied to the [`Session`].
//!    - **Device → Client**: byte chunks and driver errors from the session's
//!      event queue, framed into records and sent back as JSON.
//! 5. Stopping the accept loop and every session when [`Gateway::stop`] is
//!    called.
//!
//! # Why a single task per session?
//!
//! The session state (open device, line buffer) is owned by exactly one task,
//! so no locks are needed.  Client requests and device events are handled
//! strictly one at a time, which keeps the `Idle` / `Open` transitions easy to
//! reason about.
//!
//! # Shutdown
//!
//! A `watch` channel carries the stop signal.  The accept loop stops
//! accepting, every session sends a Close frame and releases its device, and
//! [`Gateway::stop`] waits for all of them before returning.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio_tungstenite::{
    accept_async,
    tungstenite::{Error as WsError, Message as WsMessage},
};
use tracing::{debug, error, info, warn};

use serial_bridge_core::{encode_event, GatewayEvent};

use crate::application::device::{DeviceEvent, SerialDriver};
use crate::application::session::Session;
use crate::domain::config::BridgeConfig;

// ── Public API ────────────────────────────────────────────────────────────────

/// The running gateway: one listener plus its session tasks.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use serial_bridge::domain::BridgeConfig;
/// use serial_bridge::infrastructure::{Gateway, SystemSerialDriver};
///
/// # async fn demo() -> anyhow::Result<()> {
/// let config = BridgeConfig::default();
/// let driver = Arc::new(SystemSerialDriver::new(config.read_timeout));
/// let mut gateway = Gateway::new(config, driver);
/// let addr = gateway.start().await?;
/// println!("listening on {addr}");
/// gateway.stop().await;
/// # Ok(())
/// # }
/// ```
pub struct Gateway {
    config: Arc<BridgeConfig>,
    driver: Arc<dyn SerialDriver>,
    shutdown_tx: watch::Sender<bool>,
    accept_task: Option<JoinHandle<()>>,
}

impl Gateway {
    /// Creates a stopped gateway.
    pub fn new(config: BridgeConfig, driver: Arc<dyn SerialDriver>) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            config: Arc::new(config),
            driver,
            shutdown_tx,
            accept_task: None,
        }
    }

    /// Binds the listener and starts accepting clients.
    ///
    /// Returns the address actually bound, which differs from the configured
    /// one when port `0` was requested.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the gateway is
    /// already running, or the listener cannot be bound (port in use,
    /// missing permission).
    pub async fn start(&mut self) -> anyhow::Result<SocketAddr> {
        if self.accept_task.is_some() {
            anyhow::bail!("gateway is already running");
        }
        self.config.validate().context("invalid configuration")?;

        let listener = TcpListener::bind(self.config.bind_addr)
            .await
            .with_context(|| {
                format!(
                    "failed to bind WebSocket listener on {}",
                    self.config.bind_addr
                )
            })?;
        let local_addr = listener
            .local_addr()
            .context("failed to read the bound listener address")?;

        // A previous stop() leaves `true` behind.
        self.shutdown_tx.send_replace(false);

        info!("serial bridge listening on ws://{local_addr}");

        self.accept_task = Some(tokio::spawn(accept_loop(
            listener,
            Arc::clone(&self.config),
            Arc::clone(&self.driver),
            self.shutdown_tx.subscribe(),
        )));

        Ok(local_addr)
    }

    /// Stops accepting, closes every session and its device, and waits for
    /// all session tasks to finish.  Does nothing if the gateway is not
    /// running.
    pub async fn stop(&mut self) {
        let Some(task) = self.accept_task.take() else {
            return;
        };

        info!("stopping serial bridge");
        self.shutdown_tx.send_replace(true);

        if let Err(e) = task.await {
            error!("accept loop ended abnormally: {e}");
        }
        info!("serial bridge stopped");
    }

    /// Returns `true` between a successful [`start`](Self::start) and
    /// [`stop`](Self::stop).
    pub fn is_running(&self) -> bool {
        self.accept_task.is_some()
    }
}

// ── Accept loop ───────────────────────────────────────────────────────────────

async fn accept_loop(
    listener: TcpListener,
    config: Arc<BridgeConfig>,
    driver: Arc<dyn SerialDriver>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut sessions = JoinSet::new();

    loop {
        tokio::select! {
            _ = shutdown_requested(&mut shutdown) => {
                info!("shutdown requested; no longer accepting clients");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer_addr)) => {
                    info!("new client connection from {peer_addr}");
                    sessions.spawn(handle_client(
                        stream,
                        peer_addr,
                        Arc::clone(&config),
                        Arc::clone(&driver),
                        shutdown.clone(),
                    ));
                }
                Err(e) => {
                    // Transient accept error (e.g., too many open file
                    // descriptors).  Keep serving the clients we have.
                    error!("accept error: {e}");
                }
            },
            // Reap finished sessions so the set does not grow without bound.
            Some(joined) = sessions.join_next(), if !sessions.is_empty() => {
                if let Err(e) = joined {
                    error!("session task failed: {e}");
                }
            }
        }
    }

    drop(listener);

    while let Some(joined) = sessions.join_next().await {
        if let Err(e) = joined {
            error!("session task failed during shutdown: {e}");
        }
    }
}

/// Resolves once the gateway has been asked to stop.
///
/// Also resolves if the [`Gateway`] itself was dropped without calling
/// [`Gateway::stop`].
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

// ── Per-session handler ───────────────────────────────────────────────────────

/// Top-level handler for a single client connection.
///
/// Wraps [`run_session`] and logs the outcome, so `?` can be used freely
/// inside.
async fn handle_client(
    stream: TcpStream,
    peer_addr: SocketAddr,
    config: Arc<BridgeConfig>,
    driver: Arc<dyn SerialDriver>,
    shutdown: watch::Receiver<bool>,
) {
    match run_session(stream, peer_addr, config, driver, shutdown).await {
        Ok(()) => info!("client {peer_addr} closed normally"),
        Err(e) => warn!("client {peer_addr} closed with error: {e:#}"),
    }
}

/// Runs the complete lifecycle of a single client session.
///
/// 1. Completes the WebSocket handshake.
/// 2. Creates an idle [`Session`] and its device event queue.
/// 3. Loops over client frames, device events and the shutdown signal.
/// 4. Releases the device on every exit path.
///
/// # Errors
///
/// Returns an error if the handshake fails or an outgoing frame cannot be
/// written.
async fn run_session(
    stream: TcpStream,
    peer_addr: SocketAddr,
    config: Arc<BridgeConfig>,
    driver: Arc<dyn SerialDriver>,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let ws_stream = accept_async(stream)
        .await
        .with_context(|| format!("WebSocket handshake failed with {peer_addr}"))?;
    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    let (events_tx, mut events_rx) = mpsc::channel::<DeviceEvent>(config.event_queue_capacity);
    let mut session = Session::new(driver, config.max_record_len, events_tx);
    let id = session.id();

    info!("session {id} established with {peer_addr}");

    let outcome: anyhow::Result<()> = async {
        loop {
            let events = tokio::select! {
                _ = shutdown_requested(&mut shutdown) => {
                    debug!("session {id}: closing for shutdown");
                    // The peer may already be gone; nothing to do about it.
                    let _ = ws_tx.send(WsMessage::Close(None)).await;
                    break;
                }

                frame = ws_rx.next() => match frame {
                    Some(Ok(WsMessage::Text(text))) => session.handle_text(&text).await,
                    Some(Ok(WsMessage::Binary(data))) => {
                        warn!("session {id}: unexpected binary frame ({} bytes)", data.len());
                        vec![GatewayEvent::error("Binary frames are not supported")]
                    }
                    Some(Ok(WsMessage::Close(_))) => {
                        debug!("session {id}: client sent Close");
                        break;
                    }
                    // Pings are answered by tungstenite on the next write.
                    Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_))) => {
                        continue;
                    }
                    Some(Err(WsError::ConnectionClosed | WsError::Protocol(_))) | None => {
                        debug!("session {id}: client stream ended");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!("session {id}: WebSocket error: {e}");
                        break;
                    }
                },

                // `events_tx` lives in the session, so this never yields `None`
                // while the loop runs.
                Some(event) = events_rx.recv() => session.handle_device_event(event),
            };

            for event in events {
                let json = match encode_event(&event) {
                    Ok(json) => json,
                    Err(e) => {
                        error!("session {id}: {e}");
                        continue;
                    }
                };
                ws_tx
                    .send(WsMessage::Text(json))
                    .await
                    .with_context(|| format!("session {id}: failed to send {}", event.kind()))?;
            }
        }
        Ok(())
    }
    .await;

    session.close();
    // Anything a device sent after the close is dropped with the queue.
    drop(events_rx);

    outcome
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serial_bridge_core::{BaudRate, PortInfo};

    use crate::application::device::{DeviceEventSink, DeviceHandle, DriverError};

    /// A driver with no ports; enough to exercise start/stop.
    struct EmptyDriver;

    #[async_trait]
    impl SerialDriver for EmptyDriver {
        async fn list_ports(&self) -> Result<Vec<PortInfo>, DriverError> {
            Ok(Vec::new())
        }

        async fn open(
            &self,
            path: &str,
            _baud_rate: BaudRate,
            _events: DeviceEventSink,
        ) -> Result<Box<dyn DeviceHandle>, DriverError> {
            Err(DriverError::Open {
                path: path.to_string(),
                message: "no such device".to_string(),
            })
        }
    }

    fn local_config() -> BridgeConfig {
        BridgeConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            ..BridgeConfig::default()
        }
    }

    #[tokio::test]
    async fn test_start_binds_ephemeral_port_and_stop_returns() {
        // Arrange
        let mut gateway = Gateway::new(local_config(), Arc::new(EmptyDriver));

        // Act
        let addr = gateway.start().await.unwrap();

        // Assert
        assert_ne!(addr.port(), 0);
        assert!(gateway.is_running());
        gateway.stop().await;
        assert!(!gateway.is_running());
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let mut gateway = Gateway::new(local_config(), Arc::new(EmptyDriver));
        gateway.start().await.unwrap();

        let second = gateway.start().await;

        assert!(second.is_err());
        gateway.stop().await;
    }

    #[tokio::test]
    async fn test_start_rejects_invalid_config() {
        let config = BridgeConfig {
            event_queue_capacity: 0,
            ..local_config()
        };
        let mut gateway = Gateway::new(config, Arc::new(EmptyDriver));

        let err = gateway.start().await.unwrap_err();

        assert!(format!("{err:#}").contains("event_queue_capacity"));
        assert!(!gateway.is_running());
    }

    #[tokio::test]
    async fn test_stop_without_start_is_noop() {
        let mut gateway = Gateway::new(local_config(), Arc::new(EmptyDriver));
        gateway.stop().await;
        assert!(!gateway.is_running());
    }

    #[tokio::test]
    async fn test_gateway_can_restart_after_stop() {
        let mut gateway = Gateway::new(local_config(), Arc::new(EmptyDriver));
        gateway.start().await.unwrap();
        gateway.stop().await;

        let addr = gateway.start().await.unwrap();

        assert_ne!(addr.port(), 0);
        gateway.stop().await;
    }
}
