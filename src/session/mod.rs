//! Session core: JSON-RPC dispatch and transfer protocol
//!
//! One session per client connection. The session owns the discovery state,
//! at most one serial channel (held by its serial worker), and the outbound
//! notification sequence. Collaborator events cross into the session through
//! an mpsc queue; collaborator code never runs against session state.

mod params;
mod serial;

pub use serial::{ConnectedPeripheral, SendOutcome};

use crate::bluetooth::traits::{ChannelFactory, DeviceDirectory, SessionEvent};
use base64::{engine::general_purpose, Engine as _};
use brickbridge_shared::{Notification, RpcError};
use params::{ConnectParams, DisconnectParams, DiscoverParams, SendParams};
use serde_json::{json, Value};
use serial::SerialCmd;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, RwLock};
use tracing::{debug, info, warn};

/// Tunables for an individual session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Bounded duration of one device inquiry
    pub inquiry_duration: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            inquiry_duration: Duration::from_secs(30),
        }
    }
}

/// Session state for one connected client
pub struct Session {
    config: SessionConfig,
    directory: Arc<dyn DeviceDirectory>,
    serial_tx: mpsc::Sender<SerialCmd>,
    /// Written only by the serial worker; read here for preconditions
    connected: Arc<RwLock<Option<ConnectedPeripheral>>>,
    notify_tx: mpsc::Sender<Notification>,
    notify_seq: AtomicU64,
}

impl Session {
    /// Create a session and start its serial worker.
    ///
    /// `event_tx` is handed to collaborators so they can post events; feed
    /// the receiving end to [`Session::pump_events`].
    pub fn new(
        config: SessionConfig,
        directory: Arc<dyn DeviceDirectory>,
        factory: Arc<dyn ChannelFactory>,
        event_tx: mpsc::Sender<SessionEvent>,
        notify_tx: mpsc::Sender<Notification>,
    ) -> Self {
        let connected = Arc::new(RwLock::new(None));
        let (serial_tx, serial_rx) = mpsc::channel(32);

        tokio::spawn(serial::serial_worker(
            factory,
            connected.clone(),
            event_tx,
            serial_rx,
        ));

        Self {
            config,
            directory,
            serial_tx,
            connected,
            notify_tx,
            notify_seq: AtomicU64::new(0),
        }
    }

    /// Dispatch one inbound JSON-RPC call.
    ///
    /// Every call resolves exactly once, with a result value or a structured
    /// error; nothing is silently dropped.
    pub async fn dispatch(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        match method {
            "discover" => self.discover(params::decode(params)?).await,
            "connect" => self.connect(params::decode(params)?).await,
            "send" => self.send(params::decode(params)?).await,
            "disconnect" => self.disconnect(params::decode(params)?).await,
            _ => Err(RpcError::method_not_found()),
        }
    }

    /// Device id of the connected peripheral, if any
    pub async fn connected_peripheral(&self) -> Option<String> {
        self.connected.read().await.as_ref().map(|c| c.device_id.clone())
    }

    async fn discover(&self, p: DiscoverParams) -> Result<Value, RpcError> {
        // New criteria restart a running inquiry
        self.directory.stop_inquiry().await;
        self.directory
            .set_filter(p.major_device_class, p.minor_device_class)
            .await;
        self.directory
            .start_inquiry(self.config.inquiry_duration, true)
            .await
            .map_err(|e| RpcError::internal(format!("failed to start inquiry: {}", e)))?;

        info!(
            "Inquiry started (class {}/{})",
            p.major_device_class, p.minor_device_class
        );
        Ok(Value::Null)
    }

    async fn connect(&self, p: ConnectParams) -> Result<Value, RpcError> {
        // Idempotent if no inquiry is running
        self.directory.stop_inquiry().await;

        if self.connected.read().await.is_some() {
            // Policy: no implicit teardown; the client must disconnect first
            return Err(RpcError::invalid_request("already connected to a peripheral"));
        }

        // Resolve against devices discovered so far, not future ones
        let known = self.directory.snapshot().await;
        if !known.iter().any(|d| d.id == p.peripheral_id) {
            return Err(RpcError::invalid_request(format!(
                "unknown peripheral {}",
                p.peripheral_id
            )));
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        self.serial_tx
            .send(SerialCmd::Open {
                device_id: p.peripheral_id.clone(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| RpcError::internal("serial worker unavailable"))?;

        match reply_rx.await {
            Ok(Ok(mtu)) => {
                info!("Connected to {} (mtu {})", p.peripheral_id, mtu);
                Ok(Value::Null)
            }
            Ok(Err(e)) => Err(RpcError::internal(format!("failed to open channel: {}", e))),
            Err(_) => Err(RpcError::internal("serial worker unavailable")),
        }
    }

    async fn send(&self, p: SendParams) -> Result<Value, RpcError> {
        if self.connected.read().await.is_none() {
            return Err(RpcError::invalid_request("no peripheral connected"));
        }

        let payload = params::decode_message(&p)?;

        let (reply_tx, reply_rx) = oneshot::channel();
        self.serial_tx
            .send(SerialCmd::Send {
                payload,
                reply: reply_tx,
            })
            .await
            .map_err(|_| RpcError::internal("serial worker unavailable"))?;

        let outcome = reply_rx
            .await
            .map_err(|_| RpcError::internal("serial worker unavailable"))?;

        if outcome.any_failed {
            // Partial success: the byte count rides along in the error data
            Err(RpcError::internal("failed to send message").with_data(json!(outcome.bytes_sent)))
        } else {
            Ok(json!(outcome.bytes_sent))
        }
    }

    async fn disconnect(&self, p: DisconnectParams) -> Result<Value, RpcError> {
        let current = self.connected.read().await.clone();
        match current {
            Some(c) if c.device_id == p.peripheral_id => {
                let (reply_tx, reply_rx) = oneshot::channel();
                self.serial_tx
                    .send(SerialCmd::Close { reply: reply_tx })
                    .await
                    .map_err(|_| RpcError::internal("serial worker unavailable"))?;

                match reply_rx.await {
                    Ok(Ok(())) => {
                        info!("Disconnected from {}", p.peripheral_id);
                        Ok(Value::Null)
                    }
                    // The worker has already cleared the connection; the
                    // failure is still reported to the caller
                    Ok(Err(e)) => {
                        Err(RpcError::internal(format!("failed to close channel: {}", e)))
                    }
                    Err(_) => Err(RpcError::internal("serial worker unavailable")),
                }
            }
            _ => Err(RpcError::invalid_request(format!(
                "not connected to {}",
                p.peripheral_id
            ))),
        }
    }

    /// Close any open channel. The transport adapter calls this when its
    /// client connection goes away, so the Bluetooth link is reclaimed
    /// instead of outliving the client.
    pub async fn shutdown(&self) {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .serial_tx
            .send(SerialCmd::Close { reply: reply_tx })
            .await
            .is_ok()
        {
            if let Ok(Err(e)) = reply_rx.await {
                warn!("Channel close during teardown failed: {}", e);
            }
        }
    }

    /// Relay collaborator events as outbound notifications until the event
    /// queue closes
    pub async fn pump_events(self: Arc<Self>, mut events: mpsc::Receiver<SessionEvent>) {
        while let Some(event) = events.recv().await {
            match event {
                SessionEvent::DeviceFound(dev) => {
                    debug!("Discovered {} ({})", dev.name, dev.id);
                    self.notify(
                        "didDiscoverPeripheral",
                        json!({
                            "peripheralId": dev.id,
                            "name": dev.name,
                            "rssi": dev.rssi,
                        }),
                    )
                    .await;
                }
                SessionEvent::SerialData(bytes) => {
                    // One delivery, one notification; no reassembly
                    self.notify(
                        "didReceiveMessage",
                        json!({
                            "message": general_purpose::STANDARD.encode(&bytes),
                            "encoding": "base64",
                        }),
                    )
                    .await;
                }
                SessionEvent::ChannelClosed => {
                    warn!("Serial channel lost");
                    let _ = self.serial_tx.send(SerialCmd::Reset).await;
                }
            }
        }
    }

    /// Fire-and-forget notification to the remote peer, tagged with the
    /// session's own sequence
    async fn notify(&self, method: &str, params: Value) {
        let id = self.notify_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let _ = self.notify_tx.send(Notification::new(id, method, params)).await;
    }
}
