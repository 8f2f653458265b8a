/*
[INPUT]:  Error sources (connect, transport, serialization, acks, responses, decoding)
[OUTPUT]: Structured error types with context and retry hints
[POS]:    Error handling layer - unified error types for entire crate
[UPDATE]: When adding new error sources or improving error messages
*/

use std::time::Duration;

use thiserror::Error;

/// Main error type for the Huobi websocket adapter
#[derive(Error, Debug)]
pub enum HuobiError {
    /// Initial connect to the endpoint failed
    #[error("Connection to {endpoint} failed: {message}")]
    Connection { endpoint: String, message: String },

    /// Mid-session transport failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Transport was destroyed on purpose (close, forced reconnect)
    #[error("Transport destroyed")]
    TransportDestroyed,

    /// Outbound payload could not be encoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Subscribe acknowledgement carried an error
    #[error("Subscription to {topic} failed: {message}")]
    Subscription { topic: String, message: String },

    /// Request response carried an error
    #[error("Request {id} failed: {message}")]
    Request { id: String, message: String },

    /// Inbound frame could not be decompressed or parsed
    #[error("Decode error: {0}")]
    Decode(String),

    /// Waiting for an ack or response exceeded the configured bound
    #[error("Timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// The waiter was dropped before a reply was delivered
    #[error("Waiter cancelled: {0}")]
    Cancelled(String),

    /// Session was closed by the caller
    #[error("Session closed")]
    Closed,

    /// Operation not offered by this protocol variant
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// URL parsing failed
    #[error("Invalid URL: {0}")]
    UrlParse(#[from] url::ParseError),

    /// I/O error (gzip streams)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HuobiError {
    /// Check if the error is worth retrying at the session level
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            HuobiError::Connection { .. } | HuobiError::Transport(_) | HuobiError::Timeout(_)
        )
    }

    /// Errors after which the session will not recover on its own
    pub fn is_terminal(&self) -> bool {
        matches!(self, HuobiError::Closed | HuobiError::TransportDestroyed)
    }

    pub(crate) fn connection(endpoint: &str, message: impl ToString) -> Self {
        HuobiError::Connection {
            endpoint: endpoint.to_string(),
            message: message.to_string(),
        }
    }
}

/// Result type alias for adapter operations
pub type Result<T> = std::result::Result<T, HuobiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_retryable() {
        let transport_err = HuobiError::Transport("reset by peer".to_string());
        assert!(transport_err.is_retryable());
        assert!(!transport_err.is_terminal());

        assert!(!HuobiError::Closed.is_retryable());
        assert!(HuobiError::Closed.is_terminal());
        assert!(HuobiError::TransportDestroyed.is_terminal());
    }

    #[test]
    fn test_subscription_error_message() {
        let err = HuobiError::Subscription {
            topic: "market.btcusdt.kline.1min".to_string(),
            message: "invalid topic".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Subscription to market.btcusdt.kline.1min failed: invalid topic"
        );
    }

    #[test]
    fn test_timeout_display() {
        let err = HuobiError::Timeout(Duration::from_millis(1500));
        assert_eq!(err.to_string(), "Timed out after 1500ms");
    }
}
