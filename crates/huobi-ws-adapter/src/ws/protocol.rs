/*
[INPUT]:  Decoded inbound messages, topics, correlation ids, timestamps
[OUTPUT]: Outbound ping/pong/sub/req/auth payloads and inbound classifications
[POS]:    WebSocket layer - per-variant wire dialect (market stream vs. trade stream)
[UPDATE]: When a stream changes its message shapes or a variant is added
*/

use std::fmt;

use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use url::Url;

use crate::auth::{Credentials, HmacSigner};
use crate::config::{MARKET_ENDPOINT, TRADE_ENDPOINT};
use crate::error::{HuobiError, Result};
use crate::ws::message::{
    FIELD_ERR_CODE, FIELD_ERR_MSG, OpData, ReqData, SubData, positive_i64_field, str_field,
};

/// What an inbound message means to the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Peer heartbeat; must be answered with a pong
    Ping(i64),
    /// Answer to one of our pings
    Pong(i64),
    /// Data pushed on a subscribed topic
    Update { topic: String },
    /// Subscribe acknowledgement
    SubscribeAck { topic: String },
    /// Response to a one-shot request
    RequestResult { id: String },
    /// Error status addressed to a pending ack or request
    Error { id: String },
    /// Result of the authentication handshake
    AuthAck { code: i64, message: Option<String> },
    Unrecognized,
}

/// Wire dialect of one stream
pub trait ProtocolAdapter: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    fn default_endpoint(&self) -> &'static str;

    fn build_ping(&self, ts: i64) -> Value;

    /// Pong payload answering an inbound ping
    fn handle_ping(&self, ts: i64) -> Value;

    fn subscribe_payload(&self, topic: &str) -> Value;

    fn request_payload(&self, _topic: &str, _id: &str) -> Result<Value> {
        Err(HuobiError::Unsupported(format!(
            "{} stream does not support requests",
            self.name()
        )))
    }

    fn classify(&self, msg: &Value) -> Inbound;

    /// Payload to send right after every connect, if the stream needs one
    fn handshake(&self, _endpoint: &str, _now: DateTime<Utc>) -> Result<Option<Value>> {
        Ok(None)
    }
}

/// Public market data stream (`{ping}`, `{sub, id}`, `{req, id}`)
#[derive(Debug, Clone, Copy, Default)]
pub struct MarketProtocol;

impl ProtocolAdapter for MarketProtocol {
    fn name(&self) -> &'static str {
        "market"
    }

    fn default_endpoint(&self) -> &'static str {
        MARKET_ENDPOINT
    }

    fn build_ping(&self, ts: i64) -> Value {
        json!({ "ping": ts })
    }

    fn handle_ping(&self, ts: i64) -> Value {
        json!({ "pong": ts })
    }

    fn subscribe_payload(&self, topic: &str) -> Value {
        json!(SubData {
            sub: topic.to_string(),
            id: topic.to_string(),
        })
    }

    fn request_payload(&self, topic: &str, id: &str) -> Result<Value> {
        Ok(serde_json::to_value(ReqData {
            req: topic.to_string(),
            id: id.to_string(),
        })?)
    }

    fn classify(&self, msg: &Value) -> Inbound {
        if let Some(ts) = positive_i64_field(msg, "ping") {
            return Inbound::Ping(ts);
        }
        if let Some(ts) = positive_i64_field(msg, "pong") {
            return Inbound::Pong(ts);
        }
        if let Some(topic) = str_field(msg, "ch") {
            return Inbound::Update {
                topic: topic.to_string(),
            };
        }
        if let Some(topic) = str_field(msg, "subbed") {
            return Inbound::SubscribeAck {
                topic: topic.to_string(),
            };
        }
        if let (Some(_), Some(id)) = (str_field(msg, "rep"), str_field(msg, "id")) {
            return Inbound::RequestResult { id: id.to_string() };
        }
        match (str_field(msg, "status"), str_field(msg, "id")) {
            (Some("error"), Some(id)) => Inbound::Error { id: id.to_string() },
            _ => Inbound::Unrecognized,
        }
    }
}

/// Authenticated asset/order stream (`{op, ...}` envelopes)
#[derive(Debug, Clone)]
pub struct TradeProtocol {
    signer: HmacSigner,
}

impl TradeProtocol {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            signer: HmacSigner::new(credentials),
        }
    }

    /// Signed `op: auth` payload for `endpoint`
    pub fn authenticate(&self, endpoint: &str, now: DateTime<Utc>) -> Result<Value> {
        let url = Url::parse(endpoint)?;
        let host = url
            .host_str()
            .ok_or_else(|| HuobiError::Config(format!("endpoint {endpoint} has no host")))?;
        let request = self.signer.auth_request(host, url.path(), now);
        Ok(serde_json::to_value(request)?)
    }

    fn op_message(op: &str, ts: Option<i64>, topic: Option<&str>) -> Value {
        json!(OpData {
            op: op.to_string(),
            ts,
            topic: topic.map(str::to_string),
        })
    }
}

impl ProtocolAdapter for TradeProtocol {
    fn name(&self) -> &'static str {
        "trade"
    }

    fn default_endpoint(&self) -> &'static str {
        TRADE_ENDPOINT
    }

    fn build_ping(&self, ts: i64) -> Value {
        Self::op_message("ping", Some(ts), None)
    }

    fn handle_ping(&self, ts: i64) -> Value {
        Self::op_message("pong", Some(ts), None)
    }

    fn subscribe_payload(&self, topic: &str) -> Value {
        Self::op_message("sub", None, Some(topic))
    }

    fn classify(&self, msg: &Value) -> Inbound {
        let ts = || msg.get("ts").and_then(Value::as_i64).unwrap_or_default();
        let topic = || str_field(msg, "topic").map(str::to_string);

        match str_field(msg, "op") {
            Some("ping") => Inbound::Ping(ts()),
            Some("pong") => Inbound::Pong(ts()),
            Some("sub") => match topic() {
                Some(topic) => Inbound::SubscribeAck { topic },
                None => Inbound::Unrecognized,
            },
            Some("notify") => match topic() {
                Some(topic) => Inbound::Update { topic },
                None => Inbound::Unrecognized,
            },
            Some("auth") => Inbound::AuthAck {
                code: msg
                    .get(FIELD_ERR_CODE)
                    .and_then(Value::as_i64)
                    .unwrap_or_default(),
                message: str_field(msg, FIELD_ERR_MSG).map(str::to_string),
            },
            _ => Inbound::Unrecognized,
        }
    }

    fn handshake(&self, endpoint: &str, now: DateTime<Utc>) -> Result<Option<Value>> {
        self.authenticate(endpoint, now).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use rstest::rstest;

    use super::*;

    #[test]
    fn test_market_outbound_shapes() {
        let market = MarketProtocol;
        assert_eq!(market.build_ping(1492420473027), json!({"ping": 1492420473027_i64}));
        assert_eq!(market.handle_ping(7), json!({"pong": 7}));
        assert_eq!(
            market.subscribe_payload("market.btcusdt.kline.1min"),
            json!({"sub": "market.btcusdt.kline.1min", "id": "market.btcusdt.kline.1min"})
        );
        assert_eq!(
            market.request_payload("market.btcusdt.kline.1min", "a1b2c3d4e5").unwrap(),
            json!({"req": "market.btcusdt.kline.1min", "id": "a1b2c3d4e5"})
        );
    }

    #[rstest]
    #[case(json!({"ping": 1492420473027_i64}), Inbound::Ping(1492420473027))]
    #[case(json!({"pong": 12}), Inbound::Pong(12))]
    #[case(json!({"ch": "market.btcusdt.detail", "tick": {}}), Inbound::Update { topic: "market.btcusdt.detail".into() })]
    #[case(json!({"id": "market.btcusdt.detail", "status": "ok", "subbed": "market.btcusdt.detail"}), Inbound::SubscribeAck { topic: "market.btcusdt.detail".into() })]
    #[case(json!({"rep": "market.btcusdt.detail", "id": "abc", "status": "ok"}), Inbound::RequestResult { id: "abc".into() })]
    #[case(json!({"status": "error", "id": "abc", "err-msg": "invalid"}), Inbound::Error { id: "abc".into() })]
    #[case(json!({"status": "error", "err-msg": "no id"}), Inbound::Unrecognized)]
    #[case(json!({"ping": 0, "pong": 0, "ch": ""}), Inbound::Unrecognized)]
    #[case(json!({"rep": "market.btcusdt.detail"}), Inbound::Unrecognized)]
    fn test_market_classify(#[case] msg: Value, #[case] expected: Inbound) {
        assert_eq!(MarketProtocol.classify(&msg), expected);
    }

    #[test]
    fn test_market_priority_ping_before_channel() {
        let msg = json!({"ping": 5, "ch": "market.btcusdt.detail"});
        assert_eq!(MarketProtocol.classify(&msg), Inbound::Ping(5));
    }

    fn trade() -> TradeProtocol {
        TradeProtocol::new(Credentials::new("access", "secret"))
    }

    #[test]
    fn test_trade_outbound_shapes() {
        let trade = trade();
        assert_eq!(trade.build_ping(9), json!({"op": "ping", "ts": 9}));
        assert_eq!(trade.handle_ping(9), json!({"op": "pong", "ts": 9}));
        assert_eq!(
            trade.subscribe_payload("orders.btcusdt"),
            json!({"op": "sub", "topic": "orders.btcusdt"})
        );
        assert!(matches!(
            trade.request_payload("accounts.list", "id"),
            Err(HuobiError::Unsupported(_))
        ));
    }

    #[rstest]
    #[case(json!({"op": "ping", "ts": 1489474081631_i64}), Inbound::Ping(1489474081631))]
    #[case(json!({"op": "pong", "ts": 3}), Inbound::Pong(3))]
    #[case(json!({"op": "sub", "topic": "orders.btcusdt", "err-code": 0}), Inbound::SubscribeAck { topic: "orders.btcusdt".into() })]
    #[case(json!({"op": "notify", "topic": "orders.btcusdt", "data": {}}), Inbound::Update { topic: "orders.btcusdt".into() })]
    #[case(json!({"op": "auth", "err-code": 0}), Inbound::AuthAck { code: 0, message: None })]
    #[case(json!({"op": "auth", "err-code": 2002, "err-msg": "invalid sig"}), Inbound::AuthAck { code: 2002, message: Some("invalid sig".into()) })]
    #[case(json!({"op": "sub"}), Inbound::Unrecognized)]
    #[case(json!({"ch": "market.btcusdt.detail"}), Inbound::Unrecognized)]
    fn test_trade_classify(#[case] msg: Value, #[case] expected: Inbound) {
        assert_eq!(trade().classify(&msg), expected);
    }

    #[test]
    fn test_trade_handshake_is_signed_auth() {
        let now = Utc.with_ymd_and_hms(2019, 9, 1, 18, 16, 16).unwrap();
        let payload = trade()
            .handshake(TRADE_ENDPOINT, now)
            .unwrap()
            .expect("trade stream authenticates");

        assert_eq!(payload["op"], "auth");
        assert_eq!(payload["AccessKeyId"], "access");
        assert_eq!(payload["SignatureMethod"], "HmacSHA256");
        assert_eq!(payload["SignatureVersion"], "2");
        assert_eq!(payload["Timestamp"], "2019-09-01T18:16:16");
        assert!(payload["Signature"].as_str().is_some_and(|sig| !sig.is_empty()));
    }

    #[test]
    fn test_market_has_no_handshake() {
        assert!(MarketProtocol.handshake(MARKET_ENDPOINT, Utc::now()).unwrap().is_none());
    }
}
