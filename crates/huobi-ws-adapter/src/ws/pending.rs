/*
[INPUT]:  Keys (topics or correlation ids) and the inbound message that answers them
[OUTPUT]: Single-shot waiters that resolve once, time out, or deregister when dropped
[POS]:    WebSocket layer - shared bookkeeping for pending acks and requests
[UPDATE]: When changing waiter lifetime or cancellation semantics
*/

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::oneshot;

use crate::error::{HuobiError, Result};

type Slots = HashMap<String, oneshot::Sender<Value>>;

/// Key -> single-use reply channel; at most one slot per key
#[derive(Debug, Clone, Default)]
pub struct PendingTable {
    slots: Arc<Mutex<Slots>>,
}

impl PendingTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open a slot for `key`, superseding any slot already there
    pub fn register(&self, key: &str) -> Waiter {
        let (tx, rx) = oneshot::channel();
        self.slots().insert(key.to_string(), tx);
        Waiter {
            key: key.to_string(),
            rx: Some(rx),
            table: self.clone(),
        }
    }

    /// Open a slot only if `key` has none; returns `None` when one is already pending
    pub fn try_register(&self, key: &str) -> Option<Waiter> {
        let mut slots = self.slots();
        if slots.get(key).is_some_and(|tx| !tx.is_closed()) {
            return None;
        }
        let (tx, rx) = oneshot::channel();
        slots.insert(key.to_string(), tx);
        Some(Waiter {
            key: key.to_string(),
            rx: Some(rx),
            table: self.clone(),
        })
    }

    /// Deliver `msg` to the slot for `key` and remove it; false if nothing was pending
    pub fn resolve(&self, key: &str, msg: Value) -> bool {
        let Some(tx) = self.slots().remove(key) else {
            return false;
        };
        tx.send(msg).is_ok()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.slots().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.slots().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every slot; their waiters fail with `Cancelled`
    pub fn clear(&self) {
        self.slots().clear();
    }

    fn discard_if_abandoned(&self, key: &str) {
        let mut slots = self.slots();
        if slots.get(key).is_some_and(|tx| tx.is_closed()) {
            slots.remove(key);
        }
    }
}

/// Receiving half of one pending slot
#[derive(Debug)]
pub struct Waiter {
    key: String,
    rx: Option<oneshot::Receiver<Value>>,
    table: PendingTable,
}

impl Waiter {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Wait for the reply, optionally bounded by `timeout`
    pub async fn wait(mut self, timeout: Option<Duration>) -> Result<Value> {
        let Some(rx) = self.rx.as_mut() else {
            return Err(HuobiError::Cancelled(self.key.clone()));
        };

        let reply = match timeout {
            Some(limit) => tokio::time::timeout(limit, rx)
                .await
                .map_err(|_| HuobiError::Timeout(limit))?,
            None => rx.await,
        };

        reply.map_err(|_| HuobiError::Cancelled(format!("no reply will arrive for {}", self.key)))
    }
}

impl Drop for Waiter {
    fn drop(&mut self) {
        drop(self.rx.take());
        self.table.discard_if_abandoned(&self.key);
    }
}
