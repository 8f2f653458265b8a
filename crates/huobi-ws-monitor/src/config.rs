/*
[INPUT]:  YAML configuration file
[OUTPUT]: Parsed and validated monitor configuration
[POS]:    Configuration layer - stream monitor setup
[UPDATE]: When adding new configuration options
*/

use std::time::Duration;

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};

use huobi_ws_adapter::{Credentials, SessionConfig};

/// Which Huobi stream to open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    #[default]
    Market,
    Trade,
}

/// Top-level configuration for the stream monitor
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MonitorConfig {
    #[serde(default)]
    pub stream: StreamKind,
    /// Overrides the stream's default endpoint
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_heartbeat_ms")]
    pub heartbeat_ms: u64,
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    /// Bound on subscribe acks and requests; unbounded when absent
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// Topics subscribed on start
    #[serde(default)]
    pub topics: Vec<String>,
    /// One-shot requests issued once on start (market stream only)
    #[serde(default)]
    pub requests: Vec<String>,
    /// API keys, required for the trade stream
    #[serde(default)]
    pub credentials: Option<CredentialsConfig>,
}

/// API key pair
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CredentialsConfig {
    pub access_key: String,
    pub secret_key: String,
}

fn default_heartbeat_ms() -> u64 {
    5_000
}

fn default_reconnect_delay_ms() -> u64 {
    1_000
}

impl MonitorConfig {
    /// Load configuration from YAML file
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.heartbeat_ms == 0 {
            bail!("heartbeat_ms must be positive");
        }
        if self.topics.is_empty() && self.requests.is_empty() {
            bail!("nothing to monitor: configure at least one topic or request");
        }
        if let Some(endpoint) = &self.endpoint {
            url::Url::parse(endpoint).with_context(|| format!("invalid endpoint {endpoint}"))?;
        }
        if self.stream == StreamKind::Trade {
            if self.credentials.is_none() {
                bail!("trade stream requires credentials");
            }
            if !self.requests.is_empty() {
                bail!("trade stream does not support requests");
            }
        }
        Ok(())
    }

    pub fn session_config(&self) -> SessionConfig {
        let timeout = self.timeout_ms.map(Duration::from_millis);
        let mut config = SessionConfig::default()
            .with_heartbeat_interval(Duration::from_millis(self.heartbeat_ms))
            .with_reconnect_delay(Duration::from_millis(self.reconnect_delay_ms))
            .with_ack_timeout(timeout)
            .with_request_timeout(timeout);
        if let Some(endpoint) = &self.endpoint {
            config = config.with_endpoint(endpoint.clone());
        }
        config
    }

    pub fn credentials(&self) -> Option<Credentials> {
        self.credentials
            .as_ref()
            .map(|keys| Credentials::new(keys.access_key.clone(), keys.secret_key.clone()))
    }
}
