//! Engine configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the sync engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// How long a local edit marker suppresses remote echoes.
    pub recent_change_ttl: Duration,
    /// Interval for polling identity sources that cannot push.
    pub identity_poll_interval: Duration,
    /// Minimum spacing between heartbeat syncs for an unchanged user.
    pub heartbeat_interval: Duration,
    /// Timestamps closer than this are considered the same version (ms).
    pub conflict_tolerance_ms: u64,
    /// Total push attempts made by a local save.
    pub max_sync_retries: u32,
    /// Delay before the first retry; doubles per attempt.
    pub retry_base_delay: Duration,
    /// Upper bound on the retry delay.
    pub retry_max_delay: Duration,
    /// How long a sync waits for connectivity before giving up.
    pub connection_wait_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            recent_change_ttl: Duration::from_secs(5),
            identity_poll_interval: Duration::from_secs(1),
            heartbeat_interval: Duration::from_secs(30),
            conflict_tolerance_ms: 0,
            max_sync_retries: 3,
            retry_base_delay: Duration::from_millis(500),
            retry_max_delay: Duration::from_secs(8),
            connection_wait_timeout: Duration::from_secs(10),
        }
    }
}

impl SyncConfig {
    /// Backoff delay before retry number `retry` (1-based).
    pub fn retry_delay(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry.saturating_sub(1)).unwrap_or(u32::MAX);
        self.retry_base_delay
            .saturating_mul(factor)
            .min(self.retry_max_delay)
    }
}

/// Configuration for connectivity monitoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// How often the probe loop checks connectivity.
    pub probe_interval: Duration,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            probe_interval: Duration::from_secs(15),
        }
    }
}
