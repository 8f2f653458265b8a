/*
[INPUT]:  Outgoing one-shot requests, inbound responses carrying an id
[OUTPUT]: Fresh correlation ids and waiters resolved by the matching response
[POS]:    WebSocket layer - request/response pairing over the shared stream
[UPDATE]: When changing id generation or request lifetime
*/

use std::fmt;
use std::sync::Arc;

use rand::Rng;
use serde_json::Value;

use crate::ws::pending::{PendingTable, Waiter};

const ID_LEN: usize = 10;
const ID_ALPHABET: &[u8] = b"1234567890abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Source of correlation ids
pub trait IdGenerator: Send + Sync + fmt::Debug {
    fn next_id(&self) -> String;
}

/// Random 10-character alphanumeric ids
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomIdGenerator;

impl IdGenerator for RandomIdGenerator {
    fn next_id(&self) -> String {
        let mut rng = rand::thread_rng();
        (0..ID_LEN)
            .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
            .collect()
    }
}

/// Correlation id -> waiter for in-flight requests
#[derive(Debug, Clone)]
pub struct RequestCorrelator {
    pending: PendingTable,
    ids: Arc<dyn IdGenerator>,
}

impl Default for RequestCorrelator {
    fn default() -> Self {
        Self::new(Arc::new(RandomIdGenerator))
    }
}

impl RequestCorrelator {
    pub fn new(ids: Arc<dyn IdGenerator>) -> Self {
        Self {
            pending: PendingTable::new(),
            ids,
        }
    }

    /// Reserve a fresh id that has no pending waiter
    pub fn open(&self) -> Waiter {
        loop {
            if let Some(waiter) = self.pending.try_register(&self.ids.next_id()) {
                return waiter;
            }
        }
    }

    pub fn resolve(&self, id: &str, msg: Value) -> bool {
        self.pending.resolve(id, msg)
    }

    pub fn is_pending(&self, id: &str) -> bool {
        self.pending.contains(id)
    }

    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }

    /// Fail every caller still waiting for a response
    pub fn abandon_pending(&self) {
        self.pending.clear();
    }
}
