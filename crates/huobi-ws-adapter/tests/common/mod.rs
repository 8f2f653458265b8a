/*
[INPUT]:  Test scenarios driving sessions over the in-memory transport
[OUTPUT]: Shared fixtures: deterministic ids, exchange-like responder, listener recorders
[POS]:    Test infrastructure - shared across all test modules
[UPDATE]: When adding new test patterns or fixtures
*/

//! Common test utilities for huobi-ws-adapter tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use huobi_ws_adapter::{IdGenerator, Listener, SessionConfig, listener};
use serde_json::{Value, json};

/// Correlation ids `req1`, `req2`, ...
#[derive(Debug, Default)]
pub struct SequentialIds(AtomicUsize);

impl IdGenerator for SequentialIds {
    fn next_id(&self) -> String {
        format!("req{}", self.0.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

/// Answers pings, subscribes, requests and auth the way the exchange does
pub fn exchange_responder(payload: &Value) -> Vec<Value> {
    if let Some(ts) = payload.get("ping") {
        return vec![json!({ "pong": ts })];
    }
    if let Some(topic) = payload.get("sub") {
        return vec![json!({ "id": topic, "status": "ok", "subbed": topic, "ts": 1 })];
    }
    if let (Some(topic), Some(id)) = (payload.get("req"), payload.get("id")) {
        return vec![json!({ "rep": topic, "id": id, "status": "ok", "data": topic })];
    }
    match payload.get("op").and_then(Value::as_str) {
        Some("ping") => vec![json!({ "op": "pong", "ts": payload["ts"] })],
        Some("sub") => vec![json!({ "op": "sub", "topic": payload["topic"], "err-code": 0 })],
        Some("auth") => vec![json!({ "op": "auth", "err-code": 0 })],
        _ => Vec::new(),
    }
}

/// Acks subscribes only; pings and requests go unanswered
pub fn ack_only_responder(payload: &Value) -> Vec<Value> {
    if payload.get("sub").is_some() || payload.get("op").and_then(Value::as_str) == Some("sub") {
        exchange_responder(payload)
    } else {
        Vec::new()
    }
}

/// Session config with a short reconnect backoff
pub fn fast_config() -> SessionConfig {
    SessionConfig::default().with_reconnect_delay(Duration::from_millis(50))
}

pub type Seen = Arc<Mutex<Vec<Value>>>;

/// Listener that records every message it is handed
pub fn recording(seen: &Seen) -> Listener {
    let seen = seen.clone();
    listener(move |_topic, msg| seen.lock().unwrap().push(msg.clone()))
}

pub fn seen_count(seen: &Seen) -> usize {
    seen.lock().unwrap().len()
}

/// Poll `check` for up to two seconds
pub async fn wait_until(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

/// Sent payloads whose `key` field equals `value`
pub fn count_where(sent: &[Value], key: &str, value: &str) -> usize {
    sent.iter().filter(|payload| payload[key] == value).count()
}
