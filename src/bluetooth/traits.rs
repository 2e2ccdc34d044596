//! Collaborator trait abstractions for the platform Bluetooth stack

use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

/// A device found during inquiry
#[derive(Debug, Clone)]
pub struct DiscoveredDevice {
    /// Platform address string (MAC)
    pub id: String,
    /// Display name, falling back to the address when unresolved
    pub name: String,
    /// Signal strength in dBm (if available)
    pub rssi: Option<i16>,
}

/// Events posted by collaborators into the session's event queue
///
/// Collaborators never touch session state directly; they post here and the
/// session's own tasks pick the events up.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Inquiry reported a device (duplicates possible if the stack re-reports)
    DeviceFound(DiscoveredDevice),
    /// The serial channel delivered inbound bytes
    SerialData(Vec<u8>),
    /// The serial channel failed or was closed by the peer
    ChannelClosed,
}

/// Filterable catalog of discovered devices, backed by device inquiry
#[async_trait]
pub trait DeviceDirectory: Send + Sync {
    /// Set the (major, minor) device-class constraint for inquiry
    async fn set_filter(&self, major_class: u32, minor_class: u32);

    /// Start inquiry for the given duration, reporting matches as
    /// [`SessionEvent::DeviceFound`]. Restarts if inquiry is already running.
    async fn start_inquiry(&self, duration: Duration, resolve_names: bool) -> Result<()>;

    /// Stop a running inquiry (idempotent if none is running)
    async fn stop_inquiry(&self);

    /// Snapshot of all devices discovered so far
    async fn snapshot(&self) -> Vec<DiscoveredDevice>;
}

/// An established duplex serial channel over RFCOMM
#[async_trait]
pub trait SerialChannel: Send {
    /// Maximum bytes deliverable in a single write
    fn mtu(&self) -> usize;

    /// Write one chunk of at most [`mtu`](Self::mtu) bytes
    async fn write(&mut self, chunk: &[u8]) -> Result<()>;

    /// Close the channel
    async fn close(&mut self) -> Result<()>;
}

/// Factory for opening serial channels to peripherals
#[async_trait]
pub trait ChannelFactory: Send + Sync {
    /// Open a channel to the given device. Inbound data and channel failure
    /// are delivered through `events`.
    async fn open(
        &self,
        device_id: &str,
        events: tokio::sync::mpsc::Sender<SessionEvent>,
    ) -> Result<Box<dyn SerialChannel>>;
}
