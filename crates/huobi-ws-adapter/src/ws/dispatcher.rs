/*
[INPUT]:  Decoded inbound messages
[OUTPUT]: Listener invocations, resolved acks/requests, liveness updates, pong replies
[POS]:    WebSocket layer - routing of every inbound message
[UPDATE]: When adding message kinds or changing routing priority
*/

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::ws::correlator::RequestCorrelator;
use crate::ws::heartbeat::LivenessClock;
use crate::ws::message::InboundMessage;
use crate::ws::protocol::{Inbound, ProtocolAdapter};
use crate::ws::registry::SubscriptionRegistry;

/// Routes classified inbound messages to the registry, the correlator or a listener
#[derive(Debug, Clone)]
pub struct MessageDispatcher {
    protocol: Arc<dyn ProtocolAdapter>,
    registry: SubscriptionRegistry,
    correlator: RequestCorrelator,
    clock: LivenessClock,
}

impl MessageDispatcher {
    pub fn new(
        protocol: Arc<dyn ProtocolAdapter>,
        registry: SubscriptionRegistry,
        correlator: RequestCorrelator,
        clock: LivenessClock,
    ) -> Self {
        Self {
            protocol,
            registry,
            correlator,
            clock,
        }
    }

    /// Handle one message; returns a payload that must be sent back (pong), if any.
    ///
    /// Listeners run synchronously on the caller's task.
    pub fn dispatch(&self, msg: InboundMessage) -> Option<Value> {
        match self.protocol.classify(&msg) {
            Inbound::Ping(ts) => {
                self.clock.touch();
                debug!(ts, "ping received");
                return Some(self.protocol.handle_ping(ts));
            }
            Inbound::Pong(ts) => {
                self.clock.touch();
                debug!(ts, "pong received");
            }
            Inbound::Update { topic } => match self.registry.listener(&topic) {
                Some(listener) => listener(&topic, &msg),
                None => debug!(%topic, "update without listener dropped"),
            },
            Inbound::SubscribeAck { topic } => {
                if !self.registry.resolve_ack(&topic, msg) {
                    debug!(%topic, "subscribe ack without waiter");
                }
            }
            Inbound::RequestResult { id } => {
                if !self.correlator.resolve(&id, msg) {
                    debug!(%id, "response without waiter");
                }
            }
            Inbound::Error { id } => {
                let delivered = if self.registry.has_pending_ack(&id) {
                    self.registry.resolve_ack(&id, msg)
                } else {
                    self.correlator.resolve(&id, msg)
                };
                if !delivered {
                    debug!(%id, "error status without waiter");
                }
            }
            Inbound::AuthAck { code: 0, .. } => info!(stream = self.protocol.name(), "authenticated"),
            Inbound::AuthAck { code, message } => warn!(
                stream = self.protocol.name(),
                code,
                reason = message.as_deref().unwrap_or_default(),
                "authentication rejected"
            ),
            Inbound::Unrecognized => debug!(payload = %msg, "unrecognized message dropped"),
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::Credentials;
    use crate::ws::protocol::{MarketProtocol, TradeProtocol};
    use crate::ws::registry::listener;

    fn market() -> MessageDispatcher {
        MessageDispatcher::new(
            Arc::new(MarketProtocol),
            SubscriptionRegistry::new(),
            RequestCorrelator::default(),
            LivenessClock::new(),
        )
    }

    #[test]
    fn test_ping_is_answered_with_pong() {
        let dispatcher = market();
        let reply = dispatcher.dispatch(json!({"ping": 1492420473027_i64}));
        assert_eq!(reply, Some(json!({"pong": 1492420473027_i64})));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ping_and_pong_touch_clock() {
        let dispatcher = market();
        tokio::time::advance(Duration::from_secs(8)).await;
        dispatcher.dispatch(json!({"pong": 1}));
        assert!(dispatcher.clock.elapsed() < Duration::from_secs(1));

        tokio::time::advance(Duration::from_secs(8)).await;
        dispatcher.dispatch(json!({"ping": 1}));
        assert!(dispatcher.clock.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_update_reaches_listener() {
        let dispatcher = market();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        drop(dispatcher.registry.register(
            "market.btcusdt.detail",
            listener(move |topic, msg| {
                sink.lock().unwrap().push((topic.to_string(), msg["tick"]["close"].clone()));
            }),
        ));

        dispatcher.dispatch(json!({"ch": "market.btcusdt.detail", "tick": {"close": 42}}));
        dispatcher.dispatch(json!({"ch": "market.ethusdt.detail", "tick": {"close": 7}}));

        assert_eq!(
            *seen.lock().unwrap(),
            vec![("market.btcusdt.detail".to_string(), json!(42))]
        );
    }

    #[tokio::test]
    async fn test_error_status_prefers_pending_ack() {
        let dispatcher = market();
        let ack = dispatcher.registry.register("bad.topic", listener(|_, _| {})).unwrap();

        dispatcher.dispatch(json!({"status": "error", "id": "bad.topic", "err-msg": "invalid topic"}));

        let reply = ack.wait(None).await.unwrap();
        assert_eq!(reply["err-msg"], "invalid topic");
    }

    #[tokio::test]
    async fn test_error_status_falls_back_to_request() {
        let dispatcher = market();
        let waiter = dispatcher.correlator.open();
        let id = waiter.key().to_string();

        dispatcher.dispatch(json!({"status": "error", "id": id, "err-msg": "bad request"}));

        let reply = waiter.wait(None).await.unwrap();
        assert_eq!(reply["err-msg"], "bad request");
    }

    #[tokio::test]
    async fn test_trade_notify_and_ack() {
        let dispatcher = MessageDispatcher::new(
            Arc::new(TradeProtocol::new(Credentials::new("k", "s"))),
            SubscriptionRegistry::new(),
            RequestCorrelator::default(),
            LivenessClock::new(),
        );
        let hits = Arc::new(Mutex::new(0));
        let counter = hits.clone();
        let ack = dispatcher
            .registry
            .register("orders.btcusdt", listener(move |_, _| *counter.lock().unwrap() += 1))
            .unwrap();

        dispatcher.dispatch(json!({"op": "sub", "topic": "orders.btcusdt", "err-code": 0}));
        dispatcher.dispatch(json!({"op": "notify", "topic": "orders.btcusdt", "data": {}}));

        assert!(ack.wait(None).await.is_ok());
        assert_eq!(*hits.lock().unwrap(), 1);
        assert_eq!(
            dispatcher.dispatch(json!({"op": "ping", "ts": 5})),
            Some(json!({"op": "pong", "ts": 5}))
        );
    }
}
