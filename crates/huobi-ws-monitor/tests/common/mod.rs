/*
[INPUT]:  Monitor test scenarios
[OUTPUT]: Shared fixtures: configs and an exchange-like mock connector
[POS]:    Test infrastructure - shared across all test modules
[UPDATE]: When adding new test patterns or fixtures
*/

#![allow(dead_code)]

use huobi_ws_adapter::MockConnector;
use huobi_ws_monitor::MonitorConfig;
use serde_json::{Value, json};

/// Mock connector that acks subscribes, answers pings and requests
pub fn exchange() -> MockConnector {
    MockConnector::new().with_responder(|payload: &Value| {
        if let Some(ts) = payload.get("ping") {
            return vec![json!({ "pong": ts })];
        }
        if let Some(topic) = payload.get("sub") {
            return vec![json!({ "id": topic, "status": "ok", "subbed": topic })];
        }
        if let (Some(topic), Some(id)) = (payload.get("req"), payload.get("id")) {
            return vec![json!({ "rep": topic, "id": id, "status": "ok", "data": [] })];
        }
        match payload.get("op").and_then(Value::as_str) {
            Some("sub") => vec![json!({ "op": "sub", "topic": payload["topic"], "err-code": 0 })],
            Some("ping") => vec![json!({ "op": "pong", "ts": payload["ts"] })],
            _ => Vec::new(),
        }
    })
}

pub fn market_config() -> MonitorConfig {
    MonitorConfig::from_yaml(
        r#"
stream: market
reconnect_delay_ms: 20
topics:
  - market.btcusdt.detail
  - market.ethusdt.detail
requests:
  - market.btcusdt.kline.1min
"#,
    )
    .unwrap()
}
