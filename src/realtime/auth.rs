//! Private channel authorization.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use super::BrokerError;

/// Signed payload that lets a socket join a private channel.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChannelAuth {
    pub auth: String,
    #[serde(default)]
    pub channel_data: Option<String>,
}

/// Vouches for the client's right to join a private channel.
#[async_trait]
pub trait ChannelAuthorizer: Send + Sync {
    async fn authorize(&self, socket_id: &str, channel: &str) -> Result<ChannelAuth, BrokerError>;
}

/// Signs channel joins locally with the app secret, as the broker's server
/// libraries do. Meant for self-hosted brokers and tests.
pub struct SecretAuthorizer {
    app_key: String,
    app_secret: String,
}

impl SecretAuthorizer {
    pub fn new(app_key: impl Into<String>, app_secret: impl Into<String>) -> Self {
        Self {
            app_key: app_key.into(),
            app_secret: app_secret.into(),
        }
    }

    /// `key:hex(hmac_sha256(secret, "socket_id:channel"))`
    pub fn sign(&self, socket_id: &str, channel: &str) -> Result<String, BrokerError> {
        let mut mac = Hmac::<Sha256>::new_from_slice(self.app_secret.as_bytes()).map_err(|e| {
            BrokerError::Authorization {
                channel: channel.to_string(),
                reason: e.to_string(),
            }
        })?;
        mac.update(format!("{}:{}", socket_id, channel).as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());
        Ok(format!("{}:{}", self.app_key, signature))
    }
}

#[async_trait]
impl ChannelAuthorizer for SecretAuthorizer {
    async fn authorize(&self, socket_id: &str, channel: &str) -> Result<ChannelAuth, BrokerError> {
        if self.app_secret.is_empty() {
            return Err(BrokerError::Authorization {
                channel: channel.to_string(),
                reason: "app secret is not configured".to_string(),
            });
        }
        Ok(ChannelAuth {
            auth: self.sign(socket_id, channel)?,
            channel_data: None,
        })
    }
}
