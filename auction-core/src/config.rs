use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_intake_queue_size() -> usize {
    10_000
}

fn default_worker_inbox_size() -> usize {
    100
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_backoff_base_ms() -> u64 {
    10
}

fn default_stream_keepalive_secs() -> u64 {
    30
}

fn default_broker_event_queue_size() -> usize {
    1_000
}

/// Configuration recognized by the bidding core. Every field has a
/// default so a partial TOML file is valid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_intake_queue_size")]
    pub intake_queue_size: usize,
    #[serde(default = "default_worker_inbox_size")]
    pub worker_inbox_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_backoff_base_ms")]
    pub retry_backoff_base_ms: u64,
    #[serde(default = "default_stream_keepalive_secs")]
    pub stream_keepalive_secs: u64,
    #[serde(default = "default_broker_event_queue_size")]
    pub broker_event_queue_size: usize,
    #[serde(default)]
    pub sync_mode: bool,
}

impl Config {
    pub fn retry_backoff_base(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_base_ms)
    }

    pub fn stream_keepalive_interval(&self) -> Duration {
        Duration::from_secs(self.stream_keepalive_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            intake_queue_size: default_intake_queue_size(),
            worker_inbox_size: default_worker_inbox_size(),
            max_retries: default_max_retries(),
            retry_backoff_base_ms: default_retry_backoff_base_ms(),
            stream_keepalive_secs: default_stream_keepalive_secs(),
            broker_event_queue_size: default_broker_event_queue_size(),
            sync_mode: false,
        }
    }
}
