/*
[INPUT]:  Endpoint, heartbeat, timeout and backoff settings
[OUTPUT]: SessionConfig consumed by the session manager and transports
[POS]:    Configuration layer - session tuning knobs
[UPDATE]: When adding connection options or changing defaults
*/

use std::time::Duration;

/// Public market data stream
pub const MARKET_ENDPOINT: &str = "wss://api.huobi.pro/ws";
/// Authenticated asset/order stream
pub const TRADE_ENDPOINT: &str = "wss://api.huobi.pro/ws/v1";

/// Session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Websocket endpoint; `None` picks the protocol default
    pub endpoint: Option<String>,
    /// How often a ping is sent; staleness is declared at twice this value
    pub heartbeat_interval: Duration,
    /// Read deadline applied by the production transport
    pub receive_timeout: Option<Duration>,
    /// Fixed backoff before every reconnect attempt
    pub reconnect_delay: Duration,
    /// Bound on waiting for a subscribe acknowledgement
    pub ack_timeout: Option<Duration>,
    /// Bound on waiting for a request response
    pub request_timeout: Option<Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            heartbeat_interval: Duration::from_secs(5),
            receive_timeout: Some(Duration::from_secs(10)),
            reconnect_delay: Duration::from_secs(1),
            ack_timeout: None,
            request_timeout: None,
        }
    }
}

impl SessionConfig {
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    pub fn with_receive_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.receive_timeout = timeout;
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn with_ack_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.ack_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }
}
