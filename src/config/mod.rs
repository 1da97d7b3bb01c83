//! Configuration loading and validation for the wallet desk.
//!
//! Uses serde_yaml to load YAML configuration files with support for
//! environment variable overrides for tokens and keys.

mod api;
mod app;
mod broker;
mod duration;
mod error;
mod feed;
mod notification;
mod polling;

pub use api::ApiConfig;
pub use app::AppConfig;
pub use broker::BrokerConfig;
pub use error::ConfigError;
pub use feed::FeedConfig;
pub use notification::NotificationConfig;
pub use polling::PollingConfig;

use serde::Deserialize;
use std::{env, fs};

/// Root configuration structure.
///
/// Required sections: app, api.
/// Optional sections: broker, feed, polling, notification.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Application-level settings like name and environment.
    pub app: AppConfig,
    /// Backend REST API.
    pub api: ApiConfig,
    /// Realtime channel broker (optional, polling only without it).
    #[serde(default)]
    pub broker: BrokerConfig,
    /// Live price feed (optional).
    #[serde(default)]
    pub feed: FeedConfig,
    /// Polling fallback intervals (optional).
    #[serde(default)]
    pub polling: PollingConfig,
    /// Alert sinks (optional).
    #[serde(default)]
    pub notification: NotificationConfig,
}

impl Config {
    /// Load configuration from a YAML file at the given path.
    ///
    /// First loads environment variables from `.env` file (if exists),
    /// then loads YAML config and secrets from environment variables:
    /// - `PORTAL_API_TOKEN`
    /// - `BROKER_APP_KEY`, `BROKER_APP_SECRET`
    /// - `FEED_API_KEY`
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let content = fs::read_to_string(path)?;
        let mut config: Config = serde_yaml::from_str(&content)?;

        config.load_credentials_from_env();
        config.validate()?;

        Ok(config)
    }

    /// Load secrets from environment variables.
    fn load_credentials_from_env(&mut self) {
        self.api.token = env::var("PORTAL_API_TOKEN").unwrap_or_default();
        self.broker.app_key = env::var("BROKER_APP_KEY").unwrap_or_default();
        self.broker.app_secret = env::var("BROKER_APP_SECRET").unwrap_or_default();
        if self.feed.enabled {
            self.feed.api_key = env::var("FEED_API_KEY").unwrap_or_default();
        }
    }

    /// Validate the configuration.
    ///
    /// Missing broker or feed credentials are not errors here: those
    /// components report a failed status at runtime and polling takes over.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.app.name.is_empty() {
            return Err(ConfigError::Validation("app.name is required".into()));
        }

        let base_url = self.api.base_url.trim();
        if base_url.is_empty() {
            return Err(ConfigError::Validation("api.base_url is required".into()));
        }
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ConfigError::Validation(format!(
                "api.base_url must be an http(s) URL, got {}",
                base_url
            )));
        }

        if self.app.env == "production" && self.api.token.is_empty() {
            return Err(ConfigError::Validation(
                "api token not found (set PORTAL_API_TOKEN env var)".into(),
            ));
        }

        if self.feed.enabled && self.feed.url.as_deref().unwrap_or("").is_empty() {
            return Err(ConfigError::Validation(
                "feed.url is required when the feed is enabled".into(),
            ));
        }

        if let Some(0) = self.broker.max_reconnect_attempts {
            return Err(ConfigError::Validation(
                "broker.max_reconnect_attempts must be positive".into(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
