//! RFCOMM serial channel implementation over BlueZ

use crate::bluetooth::directory::parse_address;
use crate::bluetooth::traits::{ChannelFactory, SerialChannel, SessionEvent};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bluer::rfcomm::{SocketAddr as RfcommAddr, Stream as RfcommStream};
use bluer::Address;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Default RFCOMM channel for EV3-class serial peripherals
pub const DEFAULT_RFCOMM_CHANNEL: u8 = 1;

/// Maximum bytes per write on an RFCOMM link (BlueZ default frame budget)
pub const RFCOMM_MTU: usize = 990;

/// Factory opening RFCOMM channels on a fixed channel number
pub struct RfcommChannelFactory {
    channel: u8,
}

impl RfcommChannelFactory {
    pub fn new(channel: u8) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl ChannelFactory for RfcommChannelFactory {
    async fn open(
        &self,
        device_id: &str,
        events: mpsc::Sender<SessionEvent>,
    ) -> Result<Box<dyn SerialChannel>> {
        let addr = parse_address(device_id)?;
        let socket_addr = RfcommAddr::new(addr, self.channel);

        info!("[BT] Connecting to {} channel {}", addr, self.channel);
        let stream = RfcommStream::connect(socket_addr)
            .await
            .map_err(|e| anyhow!("RFCOMM connect failed: {}", e))?;
        info!("[BT] Connected to {}", addr);

        let (reader, writer) = tokio::io::split(stream);
        let reader_task = tokio::spawn(read_loop(reader, addr, events));

        Ok(Box::new(RfcommChannel {
            writer,
            reader_task,
            peer: addr,
        }))
    }
}

/// An open RFCOMM channel; the read half runs in its own task
pub struct RfcommChannel {
    writer: WriteHalf<RfcommStream>,
    reader_task: JoinHandle<()>,
    peer: Address,
}

#[async_trait]
impl SerialChannel for RfcommChannel {
    fn mtu(&self) -> usize {
        RFCOMM_MTU
    }

    async fn write(&mut self, chunk: &[u8]) -> Result<()> {
        self.writer.write_all(chunk).await?;
        self.writer.flush().await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.reader_task.abort();
        self.writer.shutdown().await?;
        info!("[BT] Closed channel to {}", self.peer);
        Ok(())
    }
}

impl Drop for RfcommChannel {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}

/// Forward inbound bytes to the session until the peer goes away
async fn read_loop(
    mut reader: ReadHalf<RfcommStream>,
    peer: Address,
    events: mpsc::Sender<SessionEvent>,
) {
    let mut buf = vec![0u8; 4096];

    loop {
        match reader.read(&mut buf).await {
            Ok(0) => {
                info!("[BT] Peer {} closed the channel", peer);
                let _ = events.send(SessionEvent::ChannelClosed).await;
                break;
            }
            Ok(n) => {
                // Each delivery becomes exactly one event; the peripheral's
                // own framing is preserved
                if events
                    .send(SessionEvent::SerialData(buf[..n].to_vec()))
                    .await
                    .is_err()
                {
                    break;
                }
            }
            Err(e) => {
                warn!("[BT] Read error from {}: {}", peer, e);
                let _ = events.send(SessionEvent::ChannelClosed).await;
                break;
            }
        }
    }
}
