/*
[INPUT]:  Validated MonitorConfig, optional connector, shutdown token
[OUTPUT]: A running session with logging listeners, request results, periodic status logs
[POS]:    Runtime layer - drives one stream session for the monitor binary
[UPDATE]: When changing startup order, listener behaviour, or shutdown semantics
*/

use std::time::Duration;

use anyhow::Context;
use serde_json::Value;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use huobi_ws_adapter::{Connector, Session, SessionBuilder, TradeProtocol};

use crate::config::{MonitorConfig, StreamKind};
use crate::metrics::TopicMetrics;

/// One monitored stream: a session plus per-topic counters
#[derive(Debug)]
pub struct StreamMonitor {
    config: MonitorConfig,
    session: Session,
    metrics: TopicMetrics,
}

impl StreamMonitor {
    /// Open the configured stream over the network
    pub async fn connect(config: MonitorConfig) -> anyhow::Result<Self> {
        let builder = Session::builder(config.session_config());
        Self::open(config, builder).await
    }

    /// Open the configured stream over `connector`
    pub async fn connect_with(
        config: MonitorConfig,
        connector: impl Connector + 'static,
    ) -> anyhow::Result<Self> {
        let builder = Session::builder(config.session_config()).connector(connector);
        Self::open(config, builder).await
    }

    async fn open(config: MonitorConfig, mut builder: SessionBuilder) -> anyhow::Result<Self> {
        config.validate()?;
        if config.stream == StreamKind::Trade {
            let credentials = config
                .credentials()
                .context("trade stream requires credentials")?;
            builder = builder.protocol(TradeProtocol::new(credentials));
        }

        let session = builder.connect().await.context("open session")?;
        info!(
            endpoint = session.endpoint(),
            stream = session.protocol_name(),
            "session opened"
        );

        Ok(Self {
            config,
            session,
            metrics: TopicMetrics::new(),
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn metrics(&self) -> &TopicMetrics {
        &self.metrics
    }

    /// Subscribe every configured topic with a logging listener; returns how many succeeded
    pub async fn subscribe_all(&self) -> usize {
        let mut subscribed = 0;
        for topic in &self.config.topics {
            let metrics = self.metrics.clone();
            let result = self
                .session
                .subscribe(topic, move |topic, msg| {
                    metrics.record_update(topic);
                    debug!(%topic, payload = %msg, "update");
                })
                .await;

            match result {
                Ok(()) => {
                    info!(%topic, "topic subscribed");
                    subscribed += 1;
                }
                Err(err) => warn!(%topic, error = %err, "subscribe failed"),
            }
        }
        subscribed
    }

    /// Issue every configured request once; returns the successful responses
    pub async fn run_requests(&self) -> Vec<(String, Value)> {
        let mut responses = Vec::new();
        for topic in &self.config.requests {
            match self.session.request(topic).await {
                Ok(response) => {
                    info!(%topic, payload = %response, "request answered");
                    responses.push((topic.clone(), response));
                }
                Err(err) => warn!(%topic, error = %err, "request failed"),
            }
        }
        responses
    }

    /// Log status every `status_every` until `shutdown` fires or the session terminates,
    /// then close the session.
    pub async fn run_until(&self, shutdown: CancellationToken, status_every: Duration) {
        let mut ticker = interval(status_every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("shutdown requested");
                    break;
                }
                _ = self.session.run() => {
                    warn!("session terminated");
                    break;
                }
                _ = ticker.tick() => self.log_status(),
            }
        }

        self.session.close();
        info!(total_messages = self.metrics.total(), "monitor stopped");
    }

    fn log_status(&self) {
        for topic in self.metrics.snapshot() {
            info!(
                topic = %topic.topic,
                messages = topic.messages,
                idle_ms = topic
                    .last_update
                    .map(|at| at.elapsed().as_millis() as u64)
                    .unwrap_or_default(),
                "topic status"
            );
        }
        info!(
            connected = self.session.is_connected(),
            reconnects = self.session.reconnect_count(),
            silent_ms = self.session.silent_for().as_millis() as u64,
            "session status"
        );
    }
}
