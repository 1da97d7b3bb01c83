//! Desk error types.

use crate::api::ApiError;
use crate::config::ConfigError;

#[derive(Debug, thiserror::Error)]
pub enum DeskError {
    #[error("desk is already running")]
    AlreadyRunning,
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("api client error: {0}")]
    Api(#[from] ApiError),
}
