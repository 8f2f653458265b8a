/*
[INPUT]:  Topics, listener callbacks, subscribe acknowledgements
[OUTPUT]: Listener lookups, subscribe dedupe decisions, ack waiters
[POS]:    WebSocket layer - subscription bookkeeping that survives reconnects
[UPDATE]: When changing subscribe/unsubscribe or resubscribe semantics
*/

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;

use crate::ws::pending::{PendingTable, Waiter};

/// Callback invoked with `(topic, message)` for every update on a topic
pub type Listener = Arc<dyn Fn(&str, &Value) + Send + Sync>;

/// Wrap a closure as a [`Listener`]
pub fn listener<F>(callback: F) -> Listener
where
    F: Fn(&str, &Value) + Send + Sync + 'static,
{
    Arc::new(callback)
}

#[derive(Default)]
struct Topics {
    listeners: HashMap<String, Listener>,
    subscribed: BTreeSet<String>,
}

/// Topic -> listener map, `subscribed` flags and pending acks
#[derive(Clone, Default)]
pub struct SubscriptionRegistry {
    topics: Arc<Mutex<Topics>>,
    acks: PendingTable,
}

impl fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let topics = self.topics();
        f.debug_struct("SubscriptionRegistry")
            .field("subscribed", &topics.subscribed)
            .field("listeners", &topics.listeners.len())
            .field("pending_acks", &self.acks.len())
            .finish()
    }
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn topics(&self) -> MutexGuard<'_, Topics> {
        self.topics.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store `listener` for `topic` and mark it subscribed.
    ///
    /// Returns an ack waiter only when the topic was not yet subscribed, i.e. when the
    /// caller must put a subscribe command on the wire.
    pub fn register(&self, topic: &str, listener: Listener) -> Option<Waiter> {
        let mut topics = self.topics();
        let waiter = if topics.subscribed.contains(topic) {
            None
        } else {
            Some(self.acks.register(topic))
        };
        topics.listeners.insert(topic.to_string(), listener);
        topics.subscribed.insert(topic.to_string());
        waiter
    }

    pub fn listener(&self, topic: &str) -> Option<Listener> {
        self.topics().listeners.get(topic).cloned()
    }

    /// Drop the listener only; the topic stays marked subscribed
    pub fn remove_listener(&self, topic: &str) -> bool {
        self.topics().listeners.remove(topic).is_some()
    }

    pub fn resolve_ack(&self, topic: &str, msg: Value) -> bool {
        self.acks.resolve(topic, msg)
    }

    pub fn has_pending_ack(&self, topic: &str) -> bool {
        self.acks.contains(topic)
    }

    /// Copy of the current topic -> listener map
    pub fn snapshot(&self) -> Vec<(String, Listener)> {
        self.topics()
            .listeners
            .iter()
            .map(|(topic, listener)| (topic.clone(), listener.clone()))
            .collect()
    }

    pub fn clear_subscribed(&self, topic: &str) {
        self.topics().subscribed.remove(topic);
    }

    pub fn is_subscribed(&self, topic: &str) -> bool {
        self.topics().subscribed.contains(topic)
    }

    pub fn has_listener(&self, topic: &str) -> bool {
        self.topics().listeners.contains_key(topic)
    }

    pub fn subscribed_topics(&self) -> Vec<String> {
        self.topics().subscribed.iter().cloned().collect()
    }

    /// Fail every caller still waiting for an ack
    pub fn abandon_pending(&self) {
        self.acks.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::*;

    fn counting_listener(counter: Arc<AtomicUsize>) -> Listener {
        listener(move |_topic, _msg| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_second_register_needs_no_wire_command() {
        let registry = SubscriptionRegistry::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let waiter = registry.register("market.btcusdt.detail", counting_listener(first.clone()));
        assert!(waiter.is_some());
        assert!(registry.has_pending_ack("market.btcusdt.detail"));

        let again = registry.register("market.btcusdt.detail", counting_listener(second.clone()));
        assert!(again.is_none());

        let listener = registry.listener("market.btcusdt.detail").unwrap();
        listener("market.btcusdt.detail", &json!({}));
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_remove_listener_keeps_subscribed_flag() {
        let registry = SubscriptionRegistry::new();
        let _waiter = registry.register("t", listener(|_, _| {}));

        assert!(registry.remove_listener("t"));
        assert!(!registry.has_listener("t"));
        assert!(registry.is_subscribed("t"));
        assert!(registry.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_ack_resolution() {
        let registry = SubscriptionRegistry::new();
        let waiter = registry.register("t", listener(|_, _| {})).unwrap();

        assert!(registry.resolve_ack("t", json!({"subbed": "t"})));
        assert!(!registry.has_pending_ack("t"));
        assert_eq!(waiter.wait(None).await.unwrap()["subbed"], "t");
    }

    #[test]
    fn test_clear_subscribed_allows_new_command() {
        let registry = SubscriptionRegistry::new();
        drop(registry.register("t", listener(|_, _| {})));

        registry.clear_subscribed("t");
        assert!(registry.register("t", listener(|_, _| {})).is_some());
        assert_eq!(registry.subscribed_topics(), vec!["t".to_string()]);
    }
}
