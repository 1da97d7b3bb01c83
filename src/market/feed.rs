//! Streaming price feed: keeps wallet `realtime_rate` fields current.
//!
//! The feed has its own connection lifecycle, independent of the channel
//! broker, with a bounded number of reconnect attempts.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use reqwest::Url;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex, Notify};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use super::WalletStore;
use crate::config::FeedConfig;
use crate::domain::Asset;

/// Default delay before reconnecting.
const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Default reconnect attempts before giving up.
const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, WsMessage>;
type WsSource = SplitStream<WsStream>;
type WsError = tokio_tungstenite::tungstenite::Error;

/// Price feed errors.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("price feed url is not configured")]
    MissingUrl,
    #[error("price feed api key is not configured")]
    MissingApiKey,
    #[error("invalid price feed url: {0}")]
    InvalidUrl(String),
    #[error("websocket error: {0}")]
    WebSocket(#[from] WsError),
    #[error("{0}")]
    ReconnectExhausted(String),
}

/// Connection state of the price feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedStatus {
    Disconnected,
    Connecting,
    Connected,
    /// Terminal: the feed gave up or was never configured.
    Error(String),
}

/// Runtime settings for [`RateFeed`].
#[derive(Debug, Clone)]
pub struct RateFeedConfig {
    pub url: String,
    pub api_key: String,
    pub reconnect_delay: Duration,
    pub max_reconnect_attempts: u32,
}

impl RateFeedConfig {
    pub fn from_config(config: &FeedConfig) -> Self {
        Self {
            url: config.url.clone().unwrap_or_default(),
            api_key: config.api_key.clone(),
            reconnect_delay: if config.reconnect_delay.is_zero() {
                DEFAULT_RECONNECT_DELAY
            } else {
                config.reconnect_delay
            },
            max_reconnect_attempts: config
                .max_reconnect_attempts
                .unwrap_or(DEFAULT_MAX_RECONNECT_ATTEMPTS),
        }
    }

    /// Feed URL with the api key attached as an encoded query parameter.
    fn endpoint(&self) -> Result<String, FeedError> {
        let mut url =
            Url::parse(&self.url).map_err(|e| FeedError::InvalidUrl(format!("{}: {}", self.url, e)))?;
        url.query_pairs_mut().append_pair("api_key", &self.api_key);
        Ok(url.into())
    }
}

/// Websocket client for the price feed, writing into a [`WalletStore`].
pub struct RateFeed {
    config: RateFeedConfig,
    store: Arc<WalletStore>,
    sink: Arc<Mutex<Option<WsSink>>>,
    status_tx: watch::Sender<FeedStatus>,
    closed: AtomicBool,
    shutdown: Notify,
    updates: AtomicU64,
}

impl RateFeed {
    pub fn new(config: RateFeedConfig, store: Arc<WalletStore>) -> Self {
        let (status_tx, _) = watch::channel(FeedStatus::Disconnected);
        Self {
            config,
            store,
            sink: Arc::new(Mutex::new(None)),
            status_tx,
            closed: AtomicBool::new(false),
            shutdown: Notify::new(),
            updates: AtomicU64::new(0),
        }
    }

    /// Receiver for feed status changes.
    pub fn status(&self) -> watch::Receiver<FeedStatus> {
        self.status_tx.subscribe()
    }

    /// Number of wallet rate updates applied so far.
    pub fn updates(&self) -> u64 {
        self.updates.load(Ordering::Relaxed)
    }

    fn set_status(&self, status: FeedStatus) {
        self.status_tx.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Connects, subscribes to all assets and keeps reading until closed.
    ///
    /// Returns `Err` with a terminal reason once reconnect attempts are exhausted;
    /// the same reason is published as `FeedStatus::Error`.
    pub async fn run(&self) -> Result<(), FeedError> {
        if self.config.url.is_empty() {
            self.set_status(FeedStatus::Error(FeedError::MissingUrl.to_string()));
            return Err(FeedError::MissingUrl);
        }
        if self.config.api_key.is_empty() {
            self.set_status(FeedStatus::Error(FeedError::MissingApiKey.to_string()));
            return Err(FeedError::MissingApiKey);
        }
        let endpoint = match self.config.endpoint() {
            Ok(endpoint) => endpoint,
            Err(e) => {
                self.set_status(FeedStatus::Error(e.to_string()));
                return Err(e);
            }
        };

        let mut failures: u32 = 0;
        let mut last_error = String::from("connection closed");

        loop {
            if self.is_closed() {
                break;
            }

            self.set_status(FeedStatus::Connecting);
            match self.connect(&endpoint).await {
                Ok(stream) => {
                    failures = 0;
                    self.set_status(FeedStatus::Connected);
                    if let Some(reason) = self.read_loop(stream).await {
                        last_error = reason;
                    }
                    if self.is_closed() {
                        break;
                    }
                    self.set_status(FeedStatus::Disconnected);
                }
                Err(e) => {
                    warn!(error = %e, "price feed connect failed");
                    last_error = e.to_string();
                    self.set_status(FeedStatus::Disconnected);
                }
            }

            failures += 1;
            if failures > self.config.max_reconnect_attempts {
                let reason = format!(
                    "price feed unavailable after {} attempts: {}",
                    failures, last_error
                );
                error!(reason = %reason, "giving up on price feed");
                self.set_status(FeedStatus::Error(reason.clone()));
                return Err(FeedError::ReconnectExhausted(reason));
            }

            info!(delay = ?self.config.reconnect_delay, attempt = failures, "reconnecting price feed");
            tokio::select! {
                _ = tokio::time::sleep(self.config.reconnect_delay) => {}
                _ = self.shutdown.notified() => {}
            }
        }

        self.set_status(FeedStatus::Disconnected);
        Ok(())
    }

    /// Stops the feed; `run` returns shortly after.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shutdown.notify_one();

        let mut guard = self.sink.lock().await;
        if let Some(mut sink) = guard.take() {
            if let Err(e) = sink.close().await {
                debug!(error = %e, "failed to close price feed socket");
            }
        }
        info!("price feed closed");
    }

    async fn connect(&self, endpoint: &str) -> Result<WsSource, FeedError> {
        info!(url = %self.config.url, "connecting to price feed");

        let (ws_stream, _response) = connect_async(endpoint).await?;
        let (mut sink, stream) = ws_stream.split();

        let subscribe = json!({"action": "subscribe_all"});
        sink.send(WsMessage::Text(subscribe.to_string().into())).await?;
        *self.sink.lock().await = Some(sink);

        info!("price feed connected");
        Ok(stream)
    }

    /// Reads until the stream ends; returns the error text if it ended with one.
    async fn read_loop(&self, mut stream: WsSource) -> Option<String> {
        let reason = loop {
            if self.is_closed() {
                break None;
            }

            tokio::select! {
                msg = stream.next() => {
                    match msg {
                        Some(Ok(WsMessage::Text(text))) => {
                            if let Some(assets) = parse_feed_message(&text) {
                                let applied = self.store.apply_assets(&assets);
                                self.updates.fetch_add(applied as u64, Ordering::Relaxed);
                                debug!(received = assets.len(), applied, "price update");
                            }
                        }
                        Some(Ok(WsMessage::Close(_))) => {
                            info!("price feed closed by server");
                            break None;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            warn!(error = %e, "price feed read error");
                            break Some(e.to_string());
                        }
                        None => {
                            info!("price feed stream ended");
                            break None;
                        }
                    }
                }
                _ = self.shutdown.notified() => {
                    break None;
                }
            }
        };

        let mut guard = self.sink.lock().await;
        if let Some(mut sink) = guard.take() {
            let _ = sink.close().await;
        }
        reason
    }
}

/// Extracts asset records from a feed frame.
///
/// Accepts the bulk snapshot `{success, data: [..]}`, an event wrapper
/// `{event, data: Asset | [Asset]}`, a bare array, or a bare asset object.
/// Control frames and unsuccessful snapshots yield `None`.
pub fn parse_feed_message(text: &str) -> Option<Vec<Asset>> {
    let value: Value = serde_json::from_str(text).ok()?;
    match value {
        Value::Array(items) => Some(assets_from(items)),
        Value::Object(mut map) => {
            if map.get("success").and_then(Value::as_bool) == Some(false) {
                debug!(frame = %text, "unsuccessful feed frame");
                return None;
            }
            match map.remove("data") {
                Some(Value::Array(items)) => Some(assets_from(items)),
                Some(single @ Value::Object(_)) => Some(assets_from(vec![single])),
                Some(_) => None,
                None if map.contains_key("price") => Some(assets_from(vec![Value::Object(map)])),
                None => None,
            }
        }
        _ => None,
    }
}

fn assets_from(items: Vec<Value>) -> Vec<Asset> {
    items
        .into_iter()
        .filter(Value::is_object)
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect()
}
