use serde::Deserialize;
use std::time::Duration;

/// Default heartbeat interval, chosen to match the general order of
/// magnitude of the original's network timeouts (tens of seconds) rather
/// than any documented constant — the original leaves the heartbeat body
/// entirely unimplemented.
pub const DEFAULT_HEARTBEAT_SECS: u64 = 30;

/// Per-server receipt channel configuration (§6 Configuration surface).
#[derive(Debug, Clone, Deserialize)]
pub struct ReceiptConfig {
    /// Seed `channel_id`; 0 on first connection attempt.
    #[serde(default)]
    pub channel_id: u32,
    /// Seed `key`; 0 on first connection attempt.
    #[serde(default)]
    pub channel_key: u32,
    /// Maximum body bytes a single report-receipt request frame may carry;
    /// bounds how many req-ids `ReceiptChannel::build_batch` packs per send.
    pub max_body_len: usize,
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_interval_secs: u64,
}

fn default_heartbeat_secs() -> u64 {
    DEFAULT_HEARTBEAT_SECS
}

impl ReceiptConfig {
    #[must_use]
    pub fn new(max_body_len: usize) -> Self {
        Self {
            channel_id: 0,
            channel_key: 0,
            max_body_len,
            heartbeat_interval_secs: DEFAULT_HEARTBEAT_SECS,
        }
    }

    #[must_use]
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }
}
