/*
[INPUT]:  Access key pair, request method/host/path, parameter map, UTC timestamp
[OUTPUT]: Canonical query strings, base64 HMAC-SHA256 signatures, auth payloads
[POS]:    Auth layer - request signing for the authenticated trade stream
[UPDATE]: When changing signing algorithm or canonical string format
*/

use std::collections::BTreeMap;
use std::fmt;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use url::form_urlencoded;

use crate::ws::message::AuthRequest;

pub const SIGNATURE_METHOD: &str = "HmacSHA256";
pub const SIGNATURE_VERSION: &str = "2";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

type HmacSha256 = Hmac<Sha256>;

/// API key pair for authenticated streams
#[derive(Clone)]
pub struct Credentials {
    pub access_key_id: String,
    secret_key: String,
}

impl Credentials {
    pub fn new(access_key_id: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_key: secret_key.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

/// Sorts keys lexicographically and joins `key=value` pairs with `&`,
/// percent-encoding both sides.
pub fn encode_canonical_query<K, V>(params: impl IntoIterator<Item = (K, V)>) -> String
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    let sorted: BTreeMap<String, String> = params
        .into_iter()
        .map(|(k, v)| (k.as_ref().to_string(), v.as_ref().to_string()))
        .collect();

    sorted
        .iter()
        .map(|(k, v)| format!("{}={}", escape(k), escape(v)))
        .collect::<Vec<_>>()
        .join("&")
}

fn escape(value: &str) -> String {
    form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

/// HMAC-SHA256 of `data` keyed by `secret`, base64 encoded
pub fn compute_hmac256(data: &str, secret: &str) -> String {
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => unreachable!("hmac accepts any key length"),
    };
    mac.update(data.as_bytes());
    BASE64.encode(mac.finalize().into_bytes())
}

/// Signs requests with the shared secret of a [`Credentials`] pair
#[derive(Debug, Clone)]
pub struct HmacSigner {
    credentials: Credentials,
}

impl HmacSigner {
    pub fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }

    pub fn access_key_id(&self) -> &str {
        &self.credentials.access_key_id
    }

    /// Signature over `METHOD\nHOST\nPATH\n<canonical-query>`
    pub fn sign<K, V>(
        &self,
        method: &str,
        host: &str,
        path: &str,
        params: impl IntoIterator<Item = (K, V)>,
    ) -> String
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let payload = format!(
            "{method}\n{host}\n{path}\n{}",
            encode_canonical_query(params)
        );
        compute_hmac256(&payload, &self.credentials.secret_key)
    }

    /// Adds the signing parameters to `params` and returns the signature for a REST call
    pub fn sign_request(
        &self,
        method: &str,
        host: &str,
        path: &str,
        timestamp: DateTime<Utc>,
        params: &mut BTreeMap<String, String>,
    ) -> String {
        params.insert("AccessKeyId".into(), self.credentials.access_key_id.clone());
        params.insert("SignatureMethod".into(), SIGNATURE_METHOD.into());
        params.insert("SignatureVersion".into(), SIGNATURE_VERSION.into());
        params.insert("Timestamp".into(), format_timestamp(timestamp));
        self.sign(method, host, path, params.iter())
    }

    /// Builds the `op: auth` handshake for the trade stream
    pub fn auth_request(&self, host: &str, path: &str, timestamp: DateTime<Utc>) -> AuthRequest {
        let timestamp = format_timestamp(timestamp);
        let signature = self.sign(
            "GET",
            host,
            path,
            [
                ("AccessKeyId", self.credentials.access_key_id.as_str()),
                ("SignatureMethod", SIGNATURE_METHOD),
                ("SignatureVersion", SIGNATURE_VERSION),
                ("Timestamp", timestamp.as_str()),
            ],
        );

        AuthRequest {
            op: "auth".to_string(),
            access_key_id: self.credentials.access_key_id.clone(),
            signature_method: SIGNATURE_METHOD.to_string(),
            signature_version: SIGNATURE_VERSION.to_string(),
            timestamp,
            signature,
        }
    }
}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.format(TIMESTAMP_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::TimeZone;
    use rstest::rstest;

    use super::*;

    fn signer() -> HmacSigner {
        HmacSigner::new(Credentials::new("test-access-key", "test-secret"))
    }

    #[test]
    fn test_canonical_query_sorts_keys() {
        let params = HashMap::from([("b", "2"), ("a", "1")]);
        assert_eq!(encode_canonical_query(params), "a=1&b=2");
    }

    #[rstest]
    #[case("Timestamp", "2017-05-11T16:22:06", "Timestamp=2017-05-11T16%3A22%3A06")]
    #[case("symbol", "btc usdt", "symbol=btc+usdt")]
    #[case("a/b", "x&y=z", "a%2Fb=x%26y%3Dz")]
    fn test_canonical_query_escapes(#[case] key: &str, #[case] value: &str, #[case] expected: &str) {
        assert_eq!(encode_canonical_query([(key, value)]), expected);
    }

    #[test]
    fn test_canonical_query_empty() {
        assert_eq!(encode_canonical_query(Vec::<(&str, &str)>::new()), "");
    }

    #[test]
    fn test_hmac_is_deterministic_base64() {
        let first = compute_hmac256("GET\napi.huobi.pro\n/ws/v1\na=1", "secret");
        let second = compute_hmac256("GET\napi.huobi.pro\n/ws/v1\na=1", "secret");
        assert_eq!(first, second);

        let decoded = BASE64.decode(&first).unwrap();
        assert_eq!(decoded.len(), 32);
        assert_ne!(first, compute_hmac256("GET\napi.huobi.pro\n/ws/v1\na=1", "other"));
    }

    #[test]
    fn test_hmac_known_vector() {
        // RFC 4231 test case 2
        let signature = compute_hmac256("what do ya want for nothing?", "Jefe");
        assert_eq!(signature, "W9zBRr9gdU5qBCQmCJV1x1oAPwidJzmDnexYuWTsOEM=");
    }

    #[test]
    fn test_auth_request_fields() {
        let timestamp = Utc.with_ymd_and_hms(2019, 9, 1, 18, 16, 16).unwrap();
        let request = signer().auth_request("api.huobi.pro", "/ws/v1", timestamp);

        assert_eq!(request.op, "auth");
        assert_eq!(request.access_key_id, "test-access-key");
        assert_eq!(request.signature_method, "HmacSHA256");
        assert_eq!(request.signature_version, "2");
        assert_eq!(request.timestamp, "2019-09-01T18:16:16");

        let expected = compute_hmac256(
            "GET\napi.huobi.pro\n/ws/v1\nAccessKeyId=test-access-key&SignatureMethod=HmacSHA256&SignatureVersion=2&Timestamp=2019-09-01T18%3A16%3A16",
            "test-secret",
        );
        assert_eq!(request.signature, expected);
    }

    #[test]
    fn test_sign_request_adds_signing_params() {
        let timestamp = Utc.with_ymd_and_hms(2019, 9, 1, 18, 16, 16).unwrap();
        let mut params = BTreeMap::from([("account-id".to_string(), "100009".to_string())]);

        let signature = signer().sign_request(
            "GET",
            "api.huobi.pro",
            "/v1/order/orders",
            timestamp,
            &mut params,
        );

        assert_eq!(params.len(), 5);
        assert_eq!(params["SignatureVersion"], "2");
        assert_eq!(params["Timestamp"], "2019-09-01T18:16:16");
        assert_eq!(
            signature,
            signer().sign("GET", "api.huobi.pro", "/v1/order/orders", params.iter())
        );
    }

    #[test]
    fn test_credentials_debug_redacts_secret() {
        let rendered = format!("{:?}", Credentials::new("key", "super-secret"));
        assert!(rendered.contains("key"));
        assert!(!rendered.contains("super-secret"));
    }
}
