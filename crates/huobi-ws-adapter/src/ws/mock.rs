/*
[INPUT]:  Outbound frames from a session, injected inbound payloads and failures
[OUTPUT]: In-memory transport with a sent-frame log and optional auto-replies
[POS]:    WebSocket layer - test double for the transport seam
[UPDATE]: When the transport contract changes
*/

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tokio_util::sync::CancellationToken;

use crate::error::{HuobiError, Result};
use crate::ws::codec::compress_payload;
use crate::ws::transport::{Connector, Transport};

/// Produces inbound replies for an outbound payload
pub type Responder = Arc<dyn Fn(&Value) -> Vec<Value> + Send + Sync>;

type Inbound = std::result::Result<Vec<u8>, String>;

#[derive(Default)]
struct MockShared {
    connects: AtomicUsize,
    refused_connects: AtomicUsize,
    failing_transports: AtomicUsize,
    sent: Mutex<Vec<Value>>,
    transports: Mutex<Vec<Arc<MockTransport>>>,
    responder: Mutex<Option<Responder>>,
}

impl fmt::Debug for MockShared {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockShared")
            .field("connects", &self.connects.load(Ordering::SeqCst))
            .field("sent", &lock(&self.sent).len())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Connector handing out [`MockTransport`]s
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    shared: Arc<MockShared>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply to every outbound payload with whatever `responder` returns
    pub fn with_responder<F>(self, responder: F) -> Self
    where
        F: Fn(&Value) -> Vec<Value> + Send + Sync + 'static,
    {
        *lock(&self.shared.responder) = Some(Arc::new(responder));
        self
    }

    /// Refuse the next `count` connect attempts
    pub fn refuse_next_connects(&self, count: usize) {
        self.shared.refused_connects.store(count, Ordering::SeqCst);
    }

    /// Hand out the next `count` transports with a failure already queued
    pub fn fail_next_transports(&self, count: usize) {
        self.shared.failing_transports.store(count, Ordering::SeqCst);
    }

    /// Number of successful connects so far
    pub fn connect_count(&self) -> usize {
        self.shared.connects.load(Ordering::SeqCst)
    }

    /// Every payload sent over any transport of this connector, in order
    pub fn sent(&self) -> Vec<Value> {
        lock(&self.shared.sent).clone()
    }

    /// Sent payloads carrying `key` at the top level
    pub fn sent_with_key(&self, key: &str) -> Vec<Value> {
        lock(&self.shared.sent)
            .iter()
            .filter(|payload| payload.get(key).is_some())
            .cloned()
            .collect()
    }

    /// Most recently opened transport
    pub fn latest(&self) -> Option<Arc<MockTransport>> {
        lock(&self.shared.transports).last().cloned()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, endpoint: &str) -> Result<Arc<dyn Transport>> {
        let refused = self
            .shared
            .refused_connects
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if refused {
            return Err(HuobiError::connection(endpoint, "connection refused"));
        }

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let transport = Arc::new(MockTransport {
            inbound_tx,
            inbound_rx: AsyncMutex::new(inbound_rx),
            destroyed: CancellationToken::new(),
            shared: self.shared.clone(),
        });

        let failing = self
            .shared
            .failing_transports
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            transport.fail("connection reset right after open");
        }

        lock(&self.shared.transports).push(transport.clone());
        self.shared.connects.fetch_add(1, Ordering::SeqCst);
        Ok(transport)
    }
}

/// One in-memory connection
#[derive(Debug)]
pub struct MockTransport {
    inbound_tx: mpsc::UnboundedSender<Inbound>,
    inbound_rx: AsyncMutex<mpsc::UnboundedReceiver<Inbound>>,
    destroyed: CancellationToken,
    shared: Arc<MockShared>,
}

impl MockTransport {
    /// Deliver `payload` as a gzip frame
    pub fn push(&self, payload: &Value) {
        if let Ok(frame) = compress_payload(payload) {
            self.push_raw(frame);
        }
    }

    /// Deliver raw bytes as they would arrive off the wire
    pub fn push_raw(&self, frame: Vec<u8>) {
        let _ = self.inbound_tx.send(Ok(frame));
    }

    /// Make the next `recv` fail as if the connection dropped
    pub fn fail(&self, reason: &str) {
        let _ = self.inbound_tx.send(Err(reason.to_string()));
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, frame: Vec<u8>) -> Result<()> {
        if self.destroyed.is_cancelled() {
            return Err(HuobiError::TransportDestroyed);
        }
        let payload: Value = serde_json::from_slice(&frame)?;
        lock(&self.shared.sent).push(payload.clone());

        let responder = lock(&self.shared.responder).clone();
        if let Some(responder) = responder {
            for reply in responder(&payload) {
                self.push(&reply);
            }
        }
        Ok(())
    }

    async fn recv(&self) -> Result<Vec<u8>> {
        let mut inbound = self.inbound_rx.lock().await;
        tokio::select! {
            biased;
            _ = self.destroyed.cancelled() => Err(HuobiError::TransportDestroyed),
            frame = inbound.recv() => match frame {
                Some(Ok(bytes)) => Ok(bytes),
                Some(Err(reason)) => Err(HuobiError::Transport(reason)),
                None => Err(HuobiError::TransportDestroyed),
            },
        }
    }

    fn destroy(&self) {
        self.destroyed.cancel();
    }

    fn is_destroyed(&self) -> bool {
        self.destroyed.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::ws::codec::{decode_frame, encode_payload};

    #[tokio::test]
    async fn test_responder_replies_are_received() {
        let connector = MockConnector::new().with_responder(|payload| {
            payload
                .get("sub")
                .map(|topic| vec![json!({"subbed": topic})])
                .unwrap_or_default()
        });
        let transport = connector.connect("mock://").await.unwrap();

        transport
            .send(encode_payload(&json!({"sub": "t", "id": "t"})).unwrap())
            .await
            .unwrap();

        let reply = decode_frame(&transport.recv().await.unwrap()).unwrap();
        assert_eq!(reply, json!({"subbed": "t"}));
        assert_eq!(connector.sent_with_key("sub").len(), 1);
    }

    #[tokio::test]
    async fn test_destroy_wins_over_queued_failure() {
        let connector = MockConnector::new();
        connector.connect("mock://").await.unwrap();
        let transport = connector.latest().unwrap();

        transport.fail("boom");
        transport.destroy();
        transport.destroy();

        assert!(matches!(transport.recv().await, Err(HuobiError::TransportDestroyed)));
        assert!(matches!(
            transport.send(b"{}".to_vec()).await,
            Err(HuobiError::TransportDestroyed)
        ));
    }

    #[tokio::test]
    async fn test_failing_transport_fails_first_recv() {
        let connector = MockConnector::new();
        connector.fail_next_transports(1);

        let first = connector.connect("mock://").await.unwrap();
        let second = connector.connect("mock://").await.unwrap();
        second.destroy();

        assert!(matches!(first.recv().await, Err(HuobiError::Transport(_))));
        assert!(matches!(second.recv().await, Err(HuobiError::TransportDestroyed)));
    }

    #[tokio::test]
    async fn test_refused_connects() {
        let connector = MockConnector::new();
        connector.refuse_next_connects(1);

        assert!(connector.connect("mock://").await.is_err());
        assert!(connector.connect("mock://").await.is_ok());
        assert_eq!(connector.connect_count(), 1);
    }
}
