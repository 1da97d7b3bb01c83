//! Desk configuration.

use crate::config::Config;

pub struct DeskConfig {
    pub app_config: Config,
    pub version: String,
}

impl DeskConfig {
    pub fn new(app_config: Config) -> Self {
        Self {
            app_config,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
