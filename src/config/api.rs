//! Backend REST API settings.

use serde::Deserialize;
use std::time::Duration;

use super::duration;

/// Settings for the portal REST API.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Base URL, e.g. "https://portal.example.com/api".
    pub base_url: String,
    /// Bearer token (loaded from PORTAL_API_TOKEN env var).
    #[serde(skip)]
    pub token: String,
    /// Per-request timeout (default: 15s).
    #[serde(default, with = "duration")]
    pub timeout: Duration,
}
