/*
[INPUT]:  Decoded inbound JSON values, outbound payload fields
[OUTPUT]: Wire field names, outbound payload structs, inbound field accessors
[POS]:    WebSocket layer - wire shapes shared by both protocol variants
[UPDATE]: When the exchange renames or adds wire fields
*/

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Decoded inbound frame; read positionally, never typed by schema
pub type InboundMessage = Value;

pub const FIELD_ERR_MSG: &str = "err-msg";
pub const FIELD_ERR_CODE: &str = "err-code";

/// Outbound `{req, id}` (market stream)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReqData {
    pub req: String,
    pub id: String,
}

/// Outbound `{sub, id}` (market stream)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubData {
    pub sub: String,
    pub id: String,
}

/// Outbound `{op, ...}` envelope (trade stream)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpData {
    pub op: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ts: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
}

/// Authentication handshake for the trade stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthRequest {
    pub op: String,
    #[serde(rename = "AccessKeyId")]
    pub access_key_id: String,
    #[serde(rename = "SignatureMethod")]
    pub signature_method: String,
    #[serde(rename = "SignatureVersion")]
    pub signature_version: String,
    #[serde(rename = "Timestamp")]
    pub timestamp: String,
    #[serde(rename = "Signature")]
    pub signature: String,
}

/// Non-empty string field
pub fn str_field<'a>(msg: &'a Value, key: &str) -> Option<&'a str> {
    msg.get(key)
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
}

/// Positive integer field; zero, negative and non-numeric values read as absent
pub fn positive_i64_field(msg: &Value, key: &str) -> Option<i64> {
    msg.get(key).and_then(Value::as_i64).filter(|value| *value > 0)
}

/// Error message carried by an ack or response, if any
pub fn error_message(msg: &Value) -> Option<&str> {
    msg.get(FIELD_ERR_MSG).and_then(Value::as_str)
}
