//! BlueZ-backed device directory for classic Bluetooth inquiry

use crate::bluetooth::traits::{DeviceDirectory, DiscoveredDevice, SessionEvent};
use anyhow::Result;
use async_trait::async_trait;
use bluer::{Adapter, AdapterEvent, Address, DiscoveryFilter, DiscoveryTransport};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Device-class constraint applied during inquiry
#[derive(Debug, Clone, Copy)]
struct ClassFilter {
    major: u32,
    minor: u32,
}

impl ClassFilter {
    /// Match against the major/minor fields of a Class-of-Device value
    fn matches(&self, cod: u32) -> bool {
        let major = (cod >> 8) & 0x1f;
        let minor = (cod >> 2) & 0x3f;
        major == self.major && minor == self.minor
    }
}

/// Device directory backed by the BlueZ adapter
pub struct BluezDirectory {
    adapter: Adapter,
    events: mpsc::Sender<SessionEvent>,
    filter: Arc<RwLock<Option<ClassFilter>>>,
    /// Devices discovered so far, by address string
    known: Arc<RwLock<HashMap<String, DiscoveredDevice>>>,
    /// Running inquiry task, if any
    inquiry: Mutex<Option<JoinHandle<()>>>,
}

impl BluezDirectory {
    /// Connect to the default Bluetooth adapter and power it on
    pub async fn new(events: mpsc::Sender<SessionEvent>) -> Result<Self> {
        let session = bluer::Session::new().await?;
        let adapter = session.default_adapter().await?;
        adapter.set_powered(true).await?;

        Ok(Self {
            adapter,
            events,
            filter: Arc::new(RwLock::new(None)),
            known: Arc::new(RwLock::new(HashMap::new())),
            inquiry: Mutex::new(None),
        })
    }
}

#[async_trait]
impl DeviceDirectory for BluezDirectory {
    async fn set_filter(&self, major_class: u32, minor_class: u32) {
        *self.filter.write().await = Some(ClassFilter {
            major: major_class,
            minor: minor_class,
        });
    }

    async fn start_inquiry(&self, duration: Duration, resolve_names: bool) -> Result<()> {
        // A repeated discover restarts inquiry with the new criteria
        self.stop_inquiry().await;

        // Classic (BR/EDR) devices only
        self.adapter
            .set_discovery_filter(DiscoveryFilter {
                transport: DiscoveryTransport::BrEdr,
                ..Default::default()
            })
            .await?;

        let scan = run_inquiry(
            self.adapter.clone(),
            self.filter.clone(),
            self.known.clone(),
            self.events.clone(),
            resolve_names,
        );
        let handle = tokio::spawn(bounded_inquiry(duration, self.filter.clone(), scan));

        *self.inquiry.lock().await = Some(handle);
        Ok(())
    }

    async fn stop_inquiry(&self) {
        if let Some(handle) = self.inquiry.lock().await.take() {
            // Aborting drops the discovery stream, which ends the inquiry
            handle.abort();
            info!("[BT] Inquiry stopped");
        }
        *self.filter.write().await = None;
    }

    async fn snapshot(&self) -> Vec<DiscoveredDevice> {
        self.known.read().await.values().cloned().collect()
    }
}

/// Run a scan for at most `duration`, then release the class filter
async fn bounded_inquiry(
    duration: Duration,
    filter: Arc<RwLock<Option<ClassFilter>>>,
    scan: impl std::future::Future<Output = Result<()>>,
) {
    let scan_result = timeout(duration, scan).await;

    // Timeout is expected, not an error
    match scan_result {
        Ok(Err(e)) => warn!("[BT] Inquiry failed: {}", e),
        _ => info!("[BT] Inquiry completed"),
    }

    // The filter is only held while a discovery is active
    *filter.write().await = None;
}

/// Consume the adapter's discovery stream until cancelled
async fn run_inquiry(
    adapter: Adapter,
    filter: Arc<RwLock<Option<ClassFilter>>>,
    known: Arc<RwLock<HashMap<String, DiscoveredDevice>>>,
    events: mpsc::Sender<SessionEvent>,
    resolve_names: bool,
) -> Result<()> {
    use futures::StreamExt;

    // The changes stream re-reports a device when its properties (e.g. the
    // resolved name) arrive; duplicates are fine, the session forwards each.
    let discover = if resolve_names {
        adapter.discover_devices_with_changes().await?.boxed()
    } else {
        adapter.discover_devices().await?.boxed()
    };
    tokio::pin!(discover);

    while let Some(evt) = discover.next().await {
        let AdapterEvent::DeviceAdded(addr) = evt else {
            continue;
        };

        let Ok(device) = adapter.device(addr) else {
            continue;
        };

        if !matches_filter(&filter, &device).await {
            continue;
        }

        let found = DiscoveredDevice {
            id: addr.to_string(),
            name: device
                .name()
                .await
                .ok()
                .flatten()
                .unwrap_or_else(|| addr.to_string()),
            rssi: device.rssi().await.ok().flatten(),
        };

        debug!(
            "[BT] Found {} ({}) rssi={:?}",
            found.name, found.id, found.rssi
        );

        known.write().await.insert(found.id.clone(), found.clone());
        if events.send(SessionEvent::DeviceFound(found)).await.is_err() {
            // Session is gone; no point scanning further
            break;
        }
    }

    Ok(())
}

/// Check a device's Class-of-Device against the active filter
async fn matches_filter(filter: &RwLock<Option<ClassFilter>>, device: &bluer::Device) -> bool {
    let Some(f) = *filter.read().await else {
        return true;
    };

    match device.class().await {
        Ok(Some(cod)) => f.matches(cod),
        // Class not reported yet; skip rather than guess
        _ => false,
    }
}

/// Parse a device identifier into a Bluetooth address
pub fn parse_address(device_id: &str) -> Result<Address> {
    device_id
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid device address {}: {}", device_id, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_filter_matches_cod_bits() {
        // Toy/robot: major 8, minor 1 -> CoD 0x000804
        let filter = ClassFilter { major: 8, minor: 1 };
        assert!(filter.matches(0x000804));
        assert!(!filter.matches(0x000800)); // minor 0
        assert!(!filter.matches(0x000404)); // major 4
    }

    #[test]
    fn test_class_filter_ignores_service_bits() {
        let filter = ClassFilter { major: 8, minor: 1 };
        // Service-class bits above bit 13 must not affect the match
        assert!(filter.matches(0x200804));
    }

    #[tokio::test]
    async fn test_filter_released_when_inquiry_expires() {
        let filter = Arc::new(RwLock::new(Some(ClassFilter { major: 8, minor: 1 })));

        // A scan that never yields a result on its own
        bounded_inquiry(
            Duration::from_millis(5),
            filter.clone(),
            std::future::pending::<Result<()>>(),
        )
        .await;

        assert!(filter.read().await.is_none());
    }

    #[test]
    fn test_parse_address() {
        assert!(parse_address("AA:BB:CC:DD:EE:FF").is_ok());
        assert!(parse_address("not-a-mac").is_err());
    }
}
