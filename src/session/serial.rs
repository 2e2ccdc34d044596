//! Serial worker: the single owner of all channel I/O
//!
//! Open, write and close never run on the dispatch path. They are queued to
//! this worker and processed strictly one at a time, so no two operations on
//! the physical link are ever in flight concurrently.

use crate::bluetooth::traits::{ChannelFactory, SerialChannel, SessionEvent};
use anyhow::{anyhow, Result};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, RwLock};
use tracing::warn;

/// The currently connected peripheral, readable from the dispatch path.
/// Written only by the serial worker.
#[derive(Debug, Clone)]
pub struct ConnectedPeripheral {
    pub device_id: String,
}

/// Commands processed sequentially by the serial worker
pub enum SerialCmd {
    Open {
        device_id: String,
        reply: oneshot::Sender<Result<usize>>,
    },
    Send {
        payload: Vec<u8>,
        reply: oneshot::Sender<SendOutcome>,
    },
    Close {
        reply: oneshot::Sender<Result<()>>,
    },
    /// Drop the channel without a caller (channel-level failure)
    Reset,
}

/// Aggregated outcome of a chunked send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendOutcome {
    /// Total bytes belonging to chunks that wrote successfully
    pub bytes_sent: usize,
    /// Whether any chunk reported failure
    pub any_failed: bool,
}

/// Run the serial worker until the command queue closes
pub async fn serial_worker(
    factory: Arc<dyn ChannelFactory>,
    connected: Arc<RwLock<Option<ConnectedPeripheral>>>,
    events: mpsc::Sender<SessionEvent>,
    mut commands: mpsc::Receiver<SerialCmd>,
) {
    let mut channel: Option<Box<dyn SerialChannel>> = None;

    while let Some(cmd) = commands.recv().await {
        match cmd {
            SerialCmd::Open { device_id, reply } => {
                let result = if channel.is_some() {
                    // Dispatch rejects this earlier; guard against races
                    Err(anyhow!("a channel is already open"))
                } else {
                    match factory.open(&device_id, events.clone()).await {
                        Ok(ch) => {
                            let mtu = ch.mtu();
                            *connected.write().await =
                                Some(ConnectedPeripheral { device_id });
                            channel = Some(ch);
                            Ok(mtu)
                        }
                        Err(e) => Err(e),
                    }
                };
                let _ = reply.send(result);
            }
            SerialCmd::Send { payload, reply } => {
                let outcome = match channel.as_mut() {
                    Some(ch) => send_chunked(ch.as_mut(), &payload).await,
                    // Channel dropped between the dispatch check and here
                    None => SendOutcome {
                        bytes_sent: 0,
                        any_failed: true,
                    },
                };
                let _ = reply.send(outcome);
            }
            SerialCmd::Close { reply } => {
                let result = match channel.take() {
                    Some(mut ch) => ch.close().await,
                    None => Ok(()),
                };
                // Cleared even when close fails, so a later connect can
                // open a fresh channel
                *connected.write().await = None;
                let _ = reply.send(result);
            }
            SerialCmd::Reset => {
                channel = None;
                *connected.write().await = None;
            }
        }
    }
}

/// Write a payload as MTU-sized chunks, strictly in order.
///
/// A failed chunk is not retried; retry policy belongs to the caller.
/// Aggregation uses a per-chunk success flag, never summed status codes.
pub async fn send_chunked(channel: &mut dyn SerialChannel, payload: &[u8]) -> SendOutcome {
    let mtu = channel.mtu().max(1);
    let mut bytes_sent = 0;
    let mut any_failed = false;

    for chunk in payload.chunks(mtu) {
        match channel.write(chunk).await {
            Ok(()) => bytes_sent += chunk.len(),
            Err(e) => {
                warn!("Chunk write failed: {}", e);
                any_failed = true;
            }
        }
    }

    SendOutcome {
        bytes_sent,
        any_failed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    /// Records writes; fails the chunk indices listed in `fail_chunks`
    struct MockChannel {
        mtu: usize,
        writes: Vec<Vec<u8>>,
        attempts: usize,
        fail_chunks: Vec<usize>,
    }

    impl MockChannel {
        fn new(mtu: usize) -> Self {
            Self {
                mtu,
                writes: Vec::new(),
                attempts: 0,
                fail_chunks: Vec::new(),
            }
        }
    }

    #[async_trait]
    impl SerialChannel for MockChannel {
        fn mtu(&self) -> usize {
            self.mtu
        }

        async fn write(&mut self, chunk: &[u8]) -> Result<()> {
            let index = self.attempts;
            self.attempts += 1;
            if self.fail_chunks.contains(&index) {
                return Err(anyhow!("hardware write failed"));
            }
            self.writes.push(chunk.to_vec());
            Ok(())
        }

        async fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_payload_within_mtu_is_one_write() {
        let mut ch = MockChannel::new(100);
        let outcome = send_chunked(&mut ch, b"Hello").await;

        assert_eq!(ch.writes, vec![b"Hello".to_vec()]);
        assert_eq!(
            outcome,
            SendOutcome {
                bytes_sent: 5,
                any_failed: false
            }
        );
    }

    #[tokio::test]
    async fn test_split_reassembles_to_original() {
        let payload: Vec<u8> = (0..=255).cycle().take(2500).map(|b: u16| b as u8).collect();
        let mut ch = MockChannel::new(990);
        let outcome = send_chunked(&mut ch, &payload).await;

        assert_eq!(ch.writes.len(), 3);
        assert_eq!(ch.writes[0].len(), 990);
        assert_eq!(ch.writes[1].len(), 990);
        assert_eq!(ch.writes[2].len(), 520);

        // Reassembling the chunks in order reproduces the payload exactly
        let reassembled: Vec<u8> = ch.writes.concat();
        assert_eq!(reassembled, payload);
        assert_eq!(outcome.bytes_sent, 2500);
        assert!(!outcome.any_failed);
    }

    #[tokio::test]
    async fn test_failed_chunk_is_counted_but_not_retried() {
        let mut ch = MockChannel::new(4);
        ch.fail_chunks = vec![1];

        let outcome = send_chunked(&mut ch, b"abcdefghij").await;

        // Chunks 0 and 2 succeeded (4 + 2 bytes); chunk 1 was skipped
        assert_eq!(outcome.bytes_sent, 6);
        assert!(outcome.any_failed);
        assert_eq!(ch.writes, vec![b"abcd".to_vec(), b"ij".to_vec()]);
        assert_eq!(ch.attempts, 3, "each chunk attempted exactly once");
    }

    #[tokio::test]
    async fn test_empty_payload_writes_nothing() {
        let mut ch = MockChannel::new(16);
        let outcome = send_chunked(&mut ch, b"").await;

        assert!(ch.writes.is_empty());
        assert_eq!(
            outcome,
            SendOutcome {
                bytes_sent: 0,
                any_failed: false
            }
        );
    }
}
