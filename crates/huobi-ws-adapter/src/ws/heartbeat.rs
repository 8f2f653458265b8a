/*
[INPUT]:  Heartbeat interval, inbound ping/pong observations
[OUTPUT]: Periodic outbound pings and stale-connection notifications
[POS]:    WebSocket layer - liveness tracking for one connection
[UPDATE]: When changing ping cadence or staleness rules
*/

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::Result;

/// Instant of the last inbound ping or pong
#[derive(Debug, Clone)]
pub struct LivenessClock {
    last: Arc<Mutex<Instant>>,
}

impl Default for LivenessClock {
    fn default() -> Self {
        Self::new()
    }
}

impl LivenessClock {
    pub fn new() -> Self {
        Self {
            last: Arc::new(Mutex::new(Instant::now())),
        }
    }

    pub fn touch(&self) {
        *self.last.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    pub fn last(&self) -> Instant {
        *self.last.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn elapsed(&self) -> Duration {
        Instant::now().saturating_duration_since(self.last())
    }

    /// True once nothing has been heard for twice the heartbeat interval
    pub fn is_stale(&self, heartbeat_interval: Duration) -> bool {
        self.elapsed() >= heartbeat_interval * 2
    }
}

/// What the monitor drives on every tick
#[async_trait]
pub trait HeartbeatTarget: Send + Sync {
    async fn send_heartbeat(&self) -> Result<()>;

    fn connection_stale(&self, silent_for: Duration);
}

/// Ping every `heartbeat_interval` until `stop` fires, reporting staleness after each ping
pub async fn monitor<T>(
    target: Arc<T>,
    clock: LivenessClock,
    heartbeat_interval: Duration,
    stop: CancellationToken,
) where
    T: HeartbeatTarget + ?Sized,
{
    let mut ticker = interval_at(Instant::now() + heartbeat_interval, heartbeat_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            _ = ticker.tick() => {}
        }

        if let Err(err) = target.send_heartbeat().await {
            debug!(error = %err, "heartbeat ping not sent");
        }

        if clock.is_stale(heartbeat_interval) {
            let silent_for = clock.elapsed();
            warn!(
                silent_ms = silent_for.as_millis() as u64,
                limit_ms = (heartbeat_interval * 2).as_millis() as u64,
                "no ping/pong within limit; connection is stale"
            );
            target.connection_stale(silent_for);
        }
    }
}
