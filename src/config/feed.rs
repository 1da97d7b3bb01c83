//! Market price feed settings.

use serde::Deserialize;
use std::time::Duration;

use super::duration;

/// Settings for the streaming price feed.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedConfig {
    /// Whether the live rate overlay should run at all.
    #[serde(default)]
    pub enabled: bool,
    /// Websocket URL of the feed.
    pub url: Option<String>,
    /// API key (loaded from FEED_API_KEY env var).
    #[serde(skip)]
    pub api_key: String,
    /// Delay between reconnect attempts.
    #[serde(default, with = "duration")]
    pub reconnect_delay: Duration,
    /// Reconnect attempts before giving up with a terminal error.
    pub max_reconnect_attempts: Option<u32>,
}
