/*
[INPUT]:  SessionConfig, protocol variant, connector, caller subscribe/request/send calls
[OUTPUT]: A self-healing session: reader + heartbeat tasks per connection, resubscribe on reconnect
[POS]:    WebSocket layer - session manager composing transport, registry, correlator, dispatcher
[UPDATE]: When changing connect/reconnect/close lifecycle or caller-facing operations
*/

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures_util::future::join_all;
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::auth::Credentials;
use crate::config::SessionConfig;
use crate::error::{HuobiError, Result};
use crate::ws::codec::{decode_frame, encode_payload};
use crate::ws::correlator::{IdGenerator, RandomIdGenerator, RequestCorrelator};
use crate::ws::dispatcher::MessageDispatcher;
use crate::ws::heartbeat::{self, HeartbeatTarget, LivenessClock};
use crate::ws::message::error_message;
use crate::ws::protocol::{MarketProtocol, ProtocolAdapter, TradeProtocol};
use crate::ws::registry::{Listener, SubscriptionRegistry, listener};
use crate::ws::transport::{Connector, Transport, TungsteniteConnector};

/// The connection currently owned by the session
#[derive(Debug)]
struct Link {
    generation: u64,
    transport: Arc<dyn Transport>,
    token: CancellationToken,
}

impl Link {
    fn shut(&self) {
        self.transport.destroy();
        self.token.cancel();
    }
}

/// Clears the reconnecting flag however the reconnect ends
struct ReconnectGuard<'a>(&'a AtomicBool);

impl Drop for ReconnectGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug)]
struct SessionInner {
    config: SessionConfig,
    endpoint: String,
    protocol: Arc<dyn ProtocolAdapter>,
    connector: Arc<dyn Connector>,
    registry: SubscriptionRegistry,
    correlator: RequestCorrelator,
    clock: LivenessClock,
    dispatcher: MessageDispatcher,
    link: Mutex<Option<Link>>,
    generations: AtomicU64,
    auto_reconnect: AtomicBool,
    closed: AtomicBool,
    reconnecting: AtomicBool,
    reconnects: AtomicUsize,
    terminated: Mutex<CancellationToken>,
}

/// Builder for [`Session`]; defaults to the market stream over the tungstenite transport
#[derive(Debug)]
pub struct SessionBuilder {
    config: SessionConfig,
    protocol: Arc<dyn ProtocolAdapter>,
    connector: Option<Arc<dyn Connector>>,
    ids: Option<Arc<dyn IdGenerator>>,
}

impl SessionBuilder {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            protocol: Arc::new(MarketProtocol),
            connector: None,
            ids: None,
        }
    }

    pub fn protocol(mut self, protocol: impl ProtocolAdapter + 'static) -> Self {
        self.protocol = Arc::new(protocol);
        self
    }

    pub fn connector(mut self, connector: impl Connector + 'static) -> Self {
        self.connector = Some(Arc::new(connector));
        self
    }

    /// Correlation id source for requests
    pub fn id_generator(mut self, ids: impl IdGenerator + 'static) -> Self {
        self.ids = Some(Arc::new(ids));
        self
    }

    /// Build the session and open its first connection.
    ///
    /// Fails with [`HuobiError::Connection`] when the first connect fails; that attempt is
    /// not retried.
    pub async fn connect(self) -> Result<Session> {
        let SessionBuilder {
            config,
            protocol,
            connector,
            ids,
        } = self;

        let connector = connector
            .unwrap_or_else(|| Arc::new(TungsteniteConnector::new(config.receive_timeout)));
        let endpoint = config
            .endpoint
            .clone()
            .unwrap_or_else(|| protocol.default_endpoint().to_string());
        let registry = SubscriptionRegistry::new();
        let correlator = RequestCorrelator::new(ids.unwrap_or_else(|| Arc::new(RandomIdGenerator)));
        let clock = LivenessClock::new();
        let dispatcher = MessageDispatcher::new(
            protocol.clone(),
            registry.clone(),
            correlator.clone(),
            clock.clone(),
        );

        let session = Session {
            inner: Arc::new(SessionInner {
                config,
                endpoint,
                protocol,
                connector,
                registry,
                correlator,
                clock,
                dispatcher,
                link: Mutex::new(None),
                generations: AtomicU64::new(0),
                auto_reconnect: AtomicBool::new(true),
                closed: AtomicBool::new(false),
                reconnecting: AtomicBool::new(false),
                reconnects: AtomicUsize::new(0),
                terminated: Mutex::new(CancellationToken::new()),
            }),
        };
        session.connect().await?;
        Ok(session)
    }
}

/// One logical session over a replaceable connection.
///
/// Cloning is cheap; every clone drives the same session. Each connection gets its own
/// reader task (decode, dispatch, answer pings) and heartbeat task. Both stop when that
/// connection is destroyed.
#[derive(Debug, Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    pub fn builder(config: SessionConfig) -> SessionBuilder {
        SessionBuilder::new(config)
    }

    /// Public market data session
    pub async fn market(config: SessionConfig) -> Result<Self> {
        SessionBuilder::new(config).connect().await
    }

    /// Authenticated asset/order session
    pub async fn trade(config: SessionConfig, credentials: Credentials) -> Result<Self> {
        SessionBuilder::new(config)
            .protocol(TradeProtocol::new(credentials))
            .connect()
            .await
    }

    fn link(&self) -> MutexGuard<'_, Option<Link>> {
        self.inner.link.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn terminated(&self) -> CancellationToken {
        self.inner
            .terminated
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn terminate(&self) {
        self.terminated().cancel();
    }

    /// Open a new connection and make it current, replacing any previous one.
    ///
    /// The trade stream's auth payload is the first frame on every new connection.
    pub async fn connect(&self) -> Result<()> {
        if self.is_closed() {
            return Err(HuobiError::Closed);
        }

        let endpoint = &self.inner.endpoint;
        info!(%endpoint, stream = self.protocol_name(), "connecting");
        let transport = self.inner.connector.connect(endpoint).await?;

        if let Err(err) = self.handshake(&transport).await {
            transport.destroy();
            return Err(err);
        }
        self.inner.clock.touch();
        let generation = self.inner.generations.fetch_add(1, Ordering::SeqCst) + 1;
        let token = CancellationToken::new();

        // `closed` is only set under the link lock, so a close either sees this link or
        // this check sees the close.
        let previous = {
            let mut link = self.link();
            if self.is_closed() {
                drop(link);
                transport.destroy();
                return Err(HuobiError::Closed);
            }
            let mut terminated = self
                .inner
                .terminated
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if terminated.is_cancelled() {
                *terminated = CancellationToken::new();
            }
            link.replace(Link {
                generation,
                transport: transport.clone(),
                token: token.clone(),
            })
        };
        if let Some(previous) = previous {
            debug!(generation = previous.generation, "replacing previous connection");
            previous.shut();
        }

        tokio::spawn(self.clone().read_loop(transport, generation, token.clone()));
        tokio::spawn(heartbeat::monitor(
            Arc::new(self.clone()),
            self.inner.clock.clone(),
            self.inner.config.heartbeat_interval,
            token,
        ));

        info!(%endpoint, generation, "connected");
        Ok(())
    }

    async fn handshake(&self, transport: &Arc<dyn Transport>) -> Result<()> {
        let Some(payload) = self.inner.protocol.handshake(&self.inner.endpoint, Utc::now())? else {
            return Ok(());
        };
        debug!(stream = self.protocol_name(), "sending auth handshake");
        transport.send(encode_payload(&payload)?).await
    }

    /// Re-send the auth handshake on the current connection
    pub async fn authenticate(&self) -> Result<()> {
        let transport = self.transport()?;
        self.handshake(&transport).await
    }

    async fn read_loop(self, transport: Arc<dyn Transport>, generation: u64, token: CancellationToken) {
        loop {
            let frame = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                frame = transport.recv() => frame,
            };

            match frame {
                Ok(frame) => {
                    let msg = match decode_frame(&frame) {
                        Ok(msg) => msg,
                        Err(err) => {
                            warn!(error = %err, "dropping undecodable frame");
                            continue;
                        }
                    };
                    debug!(payload = %msg, "received");
                    if let Some(reply) = self.inner.dispatcher.dispatch(msg) {
                        let sent = match encode_payload(&reply) {
                            Ok(frame) => transport.send(frame).await,
                            Err(err) => Err(err),
                        };
                        if let Err(err) = sent {
                            debug!(error = %err, "pong not sent");
                        }
                    }
                }
                Err(HuobiError::TransportDestroyed) => {
                    debug!(generation, "transport destroyed; reader stopped");
                    break;
                }
                Err(err) => {
                    transport.destroy();
                    if self.auto_reconnect() {
                        if self.is_current(generation) {
                            warn!(error = %err, generation, "transport failed; reconnecting");
                            self.spawn_reconnect();
                        }
                    } else {
                        warn!(error = %err, generation, "transport failed; session terminated");
                        self.shut_link();
                        self.terminate();
                    }
                    break;
                }
            }
        }
        token.cancel();
    }

    fn is_current(&self, generation: u64) -> bool {
        self.link()
            .as_ref()
            .is_some_and(|link| link.generation == generation)
    }

    fn shut_link(&self) {
        let current = self.link().take();
        if let Some(link) = current {
            link.shut();
        }
    }

    fn spawn_reconnect(&self) {
        let session = self.clone();
        tokio::spawn(async move { session.reconnect().await });
    }

    fn auto_reconnect(&self) -> bool {
        self.inner.auto_reconnect.load(Ordering::SeqCst) && !self.is_closed()
    }

    /// Drop the current connection, wait out the backoff and connect again, retrying until
    /// connected or closed; then resubscribe every topic that still has a listener.
    ///
    /// Concurrent calls while a reconnect is in flight return immediately. Pending
    /// requests are not carried over.
    pub async fn reconnect(&self) {
        if self
            .inner
            .reconnecting
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("reconnect already in progress");
            return;
        }

        let connected = {
            let _guard = ReconnectGuard(&self.inner.reconnecting);
            self.shut_link();

            let mut attempt: u32 = 0;
            loop {
                tokio::time::sleep(self.inner.config.reconnect_delay).await;
                if self.is_closed() {
                    break false;
                }
                attempt += 1;
                info!(attempt, endpoint = %self.inner.endpoint, "reconnecting");
                match self.connect().await {
                    Ok(()) => break true,
                    Err(HuobiError::Closed) => break false,
                    Err(err) => warn!(attempt, error = %err, "reconnect attempt failed"),
                }
            }
        };
        if !connected {
            return;
        }
        if !self.is_connected() && self.auto_reconnect() {
            debug!("new connection failed before the reconnect finished; retrying");
            self.spawn_reconnect();
            return;
        }

        let count = self.inner.reconnects.fetch_add(1, Ordering::SeqCst) + 1;
        info!(reconnects = count, "reconnected");
        self.resubscribe_all().await;
    }

    async fn resubscribe_all(&self) {
        let topics = self.inner.registry.snapshot();
        let resubscribes = topics.into_iter().map(|(topic, listener)| async move {
            self.inner.registry.clear_subscribed(&topic);
            if let Err(err) = self.subscribe_with(&topic, listener).await {
                warn!(%topic, error = %err, "resubscribe failed");
            }
        });
        join_all(resubscribes).await;
    }

    /// Re-enable auto reconnect, drop the current connection and reconnect
    pub async fn force_reconnect(&self) {
        self.inner.auto_reconnect.store(true, Ordering::SeqCst);
        self.shut_link();
        self.reconnect().await;
    }

    pub fn set_auto_reconnect(&self, enabled: bool) {
        self.inner.auto_reconnect.store(enabled, Ordering::SeqCst);
    }

    fn transport(&self) -> Result<Arc<dyn Transport>> {
        if self.is_closed() {
            return Err(HuobiError::Closed);
        }
        self.link()
            .as_ref()
            .map(|link| link.transport.clone())
            .ok_or_else(|| HuobiError::Transport("not connected".to_string()))
    }

    /// Encode `payload` as JSON and send it on the current connection
    pub async fn send_message<T: Serialize + ?Sized>(&self, payload: &T) -> Result<()> {
        let frame = encode_payload(payload)?;
        let transport = self.transport()?;
        debug!(payload = %String::from_utf8_lossy(&frame), "sending");
        transport.send(frame).await
    }

    /// Attach `callback` to `topic`, subscribing on the wire only if the topic is not
    /// subscribed yet.
    pub async fn subscribe<F>(&self, topic: &str, callback: F) -> Result<()>
    where
        F: Fn(&str, &Value) + Send + Sync + 'static,
    {
        self.subscribe_with(topic, listener(callback)).await
    }

    /// [`Session::subscribe`] with a prebuilt [`Listener`].
    ///
    /// The topic stays subscribed even when the ack reports an error.
    pub async fn subscribe_with(&self, topic: &str, listener: Listener) -> Result<()> {
        if self.is_closed() {
            return Err(HuobiError::Closed);
        }
        let Some(ack) = self.inner.registry.register(topic, listener) else {
            debug!(%topic, "already subscribed; listener replaced");
            return Ok(());
        };

        self.send_message(&self.inner.protocol.subscribe_payload(topic))
            .await?;
        let reply = ack
            .wait(self.inner.config.ack_timeout)
            .await
            .map_err(|err| self.closed_or(err))?;

        if let Some(message) = error_message(&reply).filter(|message| !message.is_empty()) {
            return Err(HuobiError::Subscription {
                topic: topic.to_string(),
                message: message.to_string(),
            });
        }
        info!(%topic, "subscribed");
        Ok(())
    }

    /// Detach the listener; no wire command exists, so the topic stays subscribed and
    /// later updates for it are dropped. A reconnect will not resubscribe it.
    pub fn unsubscribe(&self, topic: &str) -> bool {
        self.inner.registry.remove_listener(topic)
    }

    /// One-shot request, waiting up to the configured request timeout (unbounded by default)
    pub async fn request(&self, topic: &str) -> Result<Value> {
        self.request_within(topic, self.inner.config.request_timeout)
            .await
    }

    pub async fn request_with_timeout(&self, topic: &str, timeout: Duration) -> Result<Value> {
        self.request_within(topic, Some(timeout)).await
    }

    async fn request_within(&self, topic: &str, timeout: Option<Duration>) -> Result<Value> {
        if self.is_closed() {
            return Err(HuobiError::Closed);
        }
        let waiter = self.inner.correlator.open();
        let id = waiter.key().to_string();
        let payload = self.inner.protocol.request_payload(topic, &id)?;

        self.send_message(&payload).await?;
        let reply = waiter
            .wait(timeout)
            .await
            .map_err(|err| self.closed_or(err))?;

        if let Some(message) = error_message(&reply).filter(|message| !message.is_empty()) {
            return Err(HuobiError::Request {
                id,
                message: message.to_string(),
            });
        }
        Ok(reply)
    }

    fn closed_or(&self, err: HuobiError) -> HuobiError {
        match err {
            HuobiError::Cancelled(_) if self.is_closed() => HuobiError::Closed,
            other => other,
        }
    }

    /// Terminal: stop reconnecting, destroy the connection and fail every pending waiter
    pub fn close(&self) {
        self.inner.auto_reconnect.store(false, Ordering::SeqCst);
        let current = {
            let mut link = self.link();
            if self.inner.closed.swap(true, Ordering::SeqCst) {
                return;
            }
            link.take()
        };
        if let Some(link) = current {
            link.shut();
        }
        self.inner.registry.abandon_pending();
        self.inner.correlator.abandon_pending();
        self.terminate();
        info!(endpoint = %self.inner.endpoint, "session closed");
    }

    /// Wait until the session terminates: after [`Session::close`], or after a transport
    /// failure while auto reconnect is off. A later successful connect (for example via
    /// [`Session::force_reconnect`]) makes the session runnable again; only `close` is final.
    pub async fn run(&self) {
        self.terminated().cancelled().await;
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated().is_cancelled()
    }

    pub fn is_connected(&self) -> bool {
        self.link()
            .as_ref()
            .is_some_and(|link| !link.transport.is_destroyed())
    }

    pub fn is_subscribed(&self, topic: &str) -> bool {
        self.inner.registry.is_subscribed(topic)
    }

    pub fn has_listener(&self, topic: &str) -> bool {
        self.inner.registry.has_listener(topic)
    }

    pub fn subscribed_topics(&self) -> Vec<String> {
        self.inner.registry.subscribed_topics()
    }

    pub fn endpoint(&self) -> &str {
        &self.inner.endpoint
    }

    pub fn protocol_name(&self) -> &'static str {
        self.inner.protocol.name()
    }

    /// Completed reconnects since the session was built
    pub fn reconnect_count(&self) -> usize {
        self.inner.reconnects.load(Ordering::SeqCst)
    }

    /// Time since the last inbound ping or pong
    pub fn silent_for(&self) -> Duration {
        self.inner.clock.elapsed()
    }
}

#[async_trait]
impl HeartbeatTarget for Session {
    async fn send_heartbeat(&self) -> Result<()> {
        let ping = self.inner.protocol.build_ping(Utc::now().timestamp_millis());
        self.send_message(&ping).await
    }

    fn connection_stale(&self, silent_for: Duration) {
        if self.auto_reconnect() {
            info!(silent_ms = silent_for.as_millis() as u64, "stale connection; reconnecting");
            self.spawn_reconnect();
        }
    }
}
