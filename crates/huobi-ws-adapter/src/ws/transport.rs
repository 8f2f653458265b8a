/*
[INPUT]:  Endpoint URL, outbound frames
[OUTPUT]: Inbound frames, distinguishable failure vs. destroy errors
[POS]:    WebSocket layer - raw transport seam and tungstenite implementation
[UPDATE]: When changing connection handling or the transport contract
*/

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{Mutex, mpsc};
use tokio::time::Instant;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{HuobiError, Result};

const CHANNEL_CAPACITY: usize = 100;

/// Opens transports to an endpoint
#[async_trait]
pub trait Connector: Send + Sync + std::fmt::Debug {
    async fn connect(&self, endpoint: &str) -> Result<Arc<dyn Transport>>;
}

/// One established connection
///
/// `recv` must return [`HuobiError::TransportDestroyed`] once `destroy` has been called,
/// and some other error for any failure not caused by `destroy`.
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// Queue a frame for sending; safe under concurrent callers
    async fn send(&self, frame: Vec<u8>) -> Result<()>;

    /// Wait for the next inbound frame
    async fn recv(&self) -> Result<Vec<u8>>;

    /// Tear the connection down; idempotent
    fn destroy(&self);

    fn is_destroyed(&self) -> bool;
}

/// Connector backed by `tokio-tungstenite`
#[derive(Debug, Clone, Default)]
pub struct TungsteniteConnector {
    receive_timeout: Option<Duration>,
}

impl TungsteniteConnector {
    pub fn new(receive_timeout: Option<Duration>) -> Self {
        Self { receive_timeout }
    }
}

#[async_trait]
impl Connector for TungsteniteConnector {
    async fn connect(&self, endpoint: &str) -> Result<Arc<dyn Transport>> {
        let (ws_stream, _response) = connect_async(endpoint)
            .await
            .map_err(|err| HuobiError::connection(endpoint, err))?;
        info!(%endpoint, "websocket connected");

        let (mut write, mut read) = ws_stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<WsMessage>(CHANNEL_CAPACITY);
        let (inbound_tx, inbound_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let shutdown = CancellationToken::new();
        let receive_timeout = self.receive_timeout;
        let pump_shutdown = shutdown.clone();

        tokio::spawn(async move {
            let mut deadline = receive_timeout.map(|limit| Instant::now() + limit);

            let failure = loop {
                let idle = async move {
                    match deadline {
                        Some(at) => tokio::time::sleep_until(at).await,
                        None => std::future::pending().await,
                    }
                };

                tokio::select! {
                    _ = pump_shutdown.cancelled() => {
                        let _ = write.send(WsMessage::Close(None)).await;
                        break None;
                    }
                    _ = idle => {
                        let limit = receive_timeout.unwrap_or_default();
                        break Some(format!("no frame received within {}ms", limit.as_millis()));
                    }
                    outbound = outbound_rx.recv() => {
                        match outbound {
                            Some(message) => {
                                if let Err(err) = write.send(message).await {
                                    break Some(format!("send failed: {err}"));
                                }
                            }
                            None => {
                                let _ = write.send(WsMessage::Close(None)).await;
                                break None;
                            }
                        }
                    }
                    incoming = read.next() => {
                        if let Some(limit) = receive_timeout {
                            deadline = Some(Instant::now() + limit);
                        }
                        let frame = match incoming {
                            Some(Ok(WsMessage::Binary(bytes))) => bytes.to_vec(),
                            Some(Ok(WsMessage::Text(text))) => text.as_bytes().to_vec(),
                            Some(Ok(WsMessage::Close(frame))) => {
                                let _ = write.send(WsMessage::Close(None)).await;
                                break Some(format!("closed by peer: {frame:?}"));
                            }
                            Some(Ok(_)) => continue,
                            Some(Err(err)) => break Some(err.to_string()),
                            None => break Some("stream ended".to_string()),
                        };
                        if inbound_tx.send(Ok(frame)).await.is_err() {
                            break None;
                        }
                    }
                }
            };

            if let Some(reason) = failure {
                debug!(%reason, "websocket pump stopped");
                let _ = inbound_tx.send(Err(reason)).await;
            }
        });

        Ok(Arc::new(WsTransport {
            outbound_tx,
            inbound_rx: Mutex::new(inbound_rx),
            shutdown,
        }))
    }
}

/// Transport half handed to the session; the socket itself lives in the pump task
#[derive(Debug)]
pub struct WsTransport {
    outbound_tx: mpsc::Sender<WsMessage>,
    inbound_rx: Mutex<mpsc::Receiver<std::result::Result<Vec<u8>, String>>>,
    shutdown: CancellationToken,
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&self, frame: Vec<u8>) -> Result<()> {
        if self.shutdown.is_cancelled() {
            return Err(HuobiError::TransportDestroyed);
        }
        let text = String::from_utf8(frame)
            .map_err(|err| HuobiError::Transport(format!("outbound frame is not utf-8: {err}")))?;
        self.outbound_tx
            .send(WsMessage::Text(text.into()))
            .await
            .map_err(|_| HuobiError::Transport("websocket send channel closed".to_string()))
    }

    async fn recv(&self) -> Result<Vec<u8>> {
        let mut inbound = self.inbound_rx.lock().await;
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => Err(HuobiError::TransportDestroyed),
            frame = inbound.recv() => match frame {
                Some(Ok(bytes)) => Ok(bytes),
                Some(Err(reason)) => Err(HuobiError::Transport(reason)),
                None if self.shutdown.is_cancelled() => Err(HuobiError::TransportDestroyed),
                None => Err(HuobiError::Transport("websocket stream closed".to_string())),
            },
        }
    }

    fn destroy(&self) {
        self.shutdown.cancel();
    }

    fn is_destroyed(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}
