/*
[INPUT]:  Public API exports for huobi-ws-monitor crate
[OUTPUT]: Module declarations and public re-exports
[POS]:    Crate root - library entry point
[UPDATE]: When adding new modules or public exports
*/

pub mod config;
pub mod metrics;
pub mod monitor;

// Re-export main types for convenience
pub use config::{CredentialsConfig, MonitorConfig, StreamKind};
pub use metrics::{TopicMetrics, TopicSnapshot};
pub use monitor::StreamMonitor;
