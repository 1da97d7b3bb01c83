//! Realtime channel broker settings.

use serde::Deserialize;
use std::time::Duration;

use super::duration;

/// Settings for the Pusher-protocol channel broker.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BrokerConfig {
    /// Application key (loaded from BROKER_APP_KEY env var).
    #[serde(skip)]
    pub app_key: String,
    /// Application secret for local channel signing (BROKER_APP_SECRET, optional).
    #[serde(skip)]
    pub app_secret: String,
    /// Broker cluster, e.g. "eu" or "mt1".
    pub cluster: Option<String>,
    /// Full websocket URL; overrides the cluster-derived one.
    pub url: Option<String>,
    /// Path of the channel authorization endpoint, relative to api.base_url.
    pub auth_endpoint: Option<String>,
    /// Namespace prepended to event names that don't start with '.'.
    pub event_namespace: Option<String>,
    /// Delay before attempting to reconnect after disconnection.
    #[serde(default, with = "duration")]
    pub reconnect_delay: Duration,
    /// Reconnect attempts before the connection is reported as failed.
    pub max_reconnect_attempts: Option<u32>,
}
