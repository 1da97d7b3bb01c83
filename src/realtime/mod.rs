//! Realtime channel broker: one shared websocket, per-channel event maps,
//! and connection status broadcast to listeners.

mod auth;
mod broker;
mod error;
pub mod protocol;
mod status;

pub use auth::{ChannelAuth, ChannelAuthorizer, SecretAuthorizer};
pub use broker::{Broker, BrokerSettings, ChannelHandlers, ErrorHandler, EventHandler, ListenerGuard};
pub use error::BrokerError;
pub use status::ConnectionStatus;
