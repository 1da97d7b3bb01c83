//! Polling fallback intervals, one per data domain.

use serde::Deserialize;
use std::time::Duration;

use super::duration;

/// Intervals used while the realtime channel is unavailable.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PollingConfig {
    /// User snapshot and notification refresh interval (default: 15s).
    #[serde(default, with = "duration")]
    pub user_interval: Duration,
    /// Chat unread counter refresh interval (default: 60s).
    #[serde(default, with = "duration")]
    pub chat_unread_interval: Duration,
}
