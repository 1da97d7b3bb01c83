use thiserror::Error;

/// Channel broker errors.
#[derive(Debug, Clone, Error)]
pub enum BrokerError {
    #[error("broker app key is not configured")]
    MissingAppKey,

    #[error("no async runtime available to drive the broker connection")]
    NoRuntime,

    #[error("websocket error: {0}")]
    WebSocket(String),

    #[error("channel authorization failed for {channel}: {reason}")]
    Authorization { channel: String, reason: String },

    #[error("subscription to {channel} rejected: {reason}")]
    Subscription { channel: String, reason: String },

    #[error("broker error {code}: {message}")]
    Protocol { code: u16, message: String },

    #[error("not connected")]
    NotConnected,
}

impl From<tokio_tungstenite::tungstenite::Error> for BrokerError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        BrokerError::WebSocket(e.to_string())
    }
}
