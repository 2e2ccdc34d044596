//! Local-socket transport adapter
//!
//! Speaks newline-delimited JSON-RPC over a Unix domain socket. Each
//! accepted connection gets its own session with its own Bluetooth
//! collaborators; a `select!` loop multiplexes inbound calls and outbound
//! notifications over the single stream.

use crate::bluetooth::{BluezDirectory, RfcommChannelFactory};
use crate::config::BridgeConfig;
use crate::session::{Session, SessionConfig};
use anyhow::Result;
use brickbridge_shared::codec::{self, CodecError, FrameDecoder};
use brickbridge_shared::{Notification, Request, Response};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Accept loop: one session per client connection
pub async fn run(config: BridgeConfig) -> Result<()> {
    // Remove a stale socket left by a previous run
    let _ = std::fs::remove_file(&config.socket_path);

    let listener = UnixListener::bind(&config.socket_path)?;
    info!("Listening on {}", config.socket_path.display());

    loop {
        match listener.accept().await {
            Ok((stream, _)) => {
                let config = config.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_client(stream, config).await {
                        warn!("Client handler failed: {}", e);
                    }
                });
            }
            Err(e) => {
                error!("Accept failed: {}", e);
            }
        }
    }
}

/// Serve one client connection until it closes
async fn handle_client(stream: UnixStream, config: BridgeConfig) -> Result<()> {
    info!("Client connected");

    let (event_tx, event_rx) = mpsc::channel(64);
    let (notify_tx, mut notify_rx) = mpsc::channel::<Notification>(64);

    let directory = Arc::new(BluezDirectory::new(event_tx.clone()).await?);
    let factory = Arc::new(RfcommChannelFactory::new(config.rfcomm_channel));

    let session = Arc::new(Session::new(
        SessionConfig {
            inquiry_duration: config.inquiry_duration,
        },
        directory,
        factory,
        event_tx,
        notify_tx,
    ));
    let pump = tokio::spawn(session.clone().pump_events(event_rx));

    let result = serve_client(&session, stream, &mut notify_rx).await;

    // Reclaim the Bluetooth link, then release the pump's session handle;
    // with the last handle gone the serial worker's queue closes behind it
    session.shutdown().await;
    pump.abort();

    result
}

/// Drive one client connection until it closes
async fn serve_client(
    session: &Session,
    stream: UnixStream,
    notify_rx: &mut mpsc::Receiver<Notification>,
) -> Result<()> {
    let (mut reader, mut writer) = stream.into_split();
    let mut decoder = FrameDecoder::new();
    let mut read_buf = vec![0u8; 4096];

    loop {
        tokio::select! {
            // Outbound notifications (fire-and-forget)
            Some(notification) = notify_rx.recv() => {
                let frame = codec::encode(&notification)?;
                writer.write_all(&frame).await?;
            }

            // Inbound calls
            result = reader.read(&mut read_buf) => {
                match result {
                    Ok(0) => {
                        info!("Client disconnected");
                        break;
                    }
                    Ok(n) => {
                        decoder.extend(&read_buf[..n]);

                        loop {
                            match decoder.decode_next::<Request>() {
                                Ok(Some(request)) => {
                                    if let Some(response) = handle_request(session, request).await {
                                        let frame = codec::encode(&response)?;
                                        writer.write_all(&frame).await?;
                                    }
                                }
                                Ok(None) => break,
                                Err(CodecError::Json(e)) => {
                                    // Not a recognizable request; replies to our
                                    // own notifications land here. Skip the frame.
                                    debug!("Ignoring unparseable frame: {}", e);
                                }
                                Err(e) => return Err(e.into()),
                            }
                        }
                    }
                    Err(e) => {
                        warn!("Read error: {}", e);
                        break;
                    }
                }
            }
        }
    }

    Ok(())
}

/// Dispatch one request, producing a response for calls that carry an id
async fn handle_request(session: &Session, request: Request) -> Option<Response> {
    let Request {
        id, method, params, ..
    } = request;

    debug!("Call: {}", method);
    let result = session.dispatch(&method, params).await;

    let Some(id) = id else {
        // Client-side notification: resolved, but nowhere to report
        if let Err(e) = result {
            warn!("Notification call {} failed: {}", method, e);
        }
        return None;
    };

    Some(match result {
        Ok(value) => Response::success(id, value),
        Err(error) => Response::failure(id, error),
    })
}
