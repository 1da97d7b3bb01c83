//! Process-wide connection to the Pusher-protocol channel broker.
//!
//! One websocket is shared by every subscriber. Channels registered through
//! [`Broker::subscribe_private`] survive reconnects: they are re-joined after
//! every `pusher:connection_established`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, info, warn};

use super::protocol::{
    self, DEFAULT_EVENT_NAMESPACE, Frame, is_fatal_code, normalize_channel, parse_frame,
    qualify_event, transport_channel,
};
use super::status::TransportState;
use super::{BrokerError, ChannelAuthorizer, ConnectionStatus};
use crate::config::BrokerConfig;

/// Default delay before reconnecting.
const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(3);

/// Default reconnect attempts before the status becomes `Failed`.
const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 10;

/// Idle time after which the client pings; the server may lower it.
const DEFAULT_ACTIVITY_TIMEOUT: Duration = Duration::from_secs(120);

/// How long to wait for a pong before dropping the connection.
const PONG_TIMEOUT: Duration = Duration::from_secs(30);

const DEFAULT_CLUSTER: &str = "mt1";

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, WsMessage>;
type WsSource = SplitStream<WsStream>;

/// Callback for one named event on a channel.
pub type EventHandler = Arc<dyn Fn(&Value) + Send + Sync>;

/// Callback for authorization and subscription failures on a channel.
pub type ErrorHandler = Arc<dyn Fn(&BrokerError) + Send + Sync>;

type Listener = Arc<dyn Fn(ConnectionStatus) + Send + Sync>;
type Listeners = StdMutex<Vec<(u64, Listener)>>;

fn lock<T>(mutex: &StdMutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Event map for one channel.
#[derive(Default, Clone)]
pub struct ChannelHandlers {
    events: Vec<(String, EventHandler)>,
    on_error: Option<ErrorHandler>,
}

impl ChannelHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler. Names follow the Echo convention: prefix with `.`
    /// to bind the name verbatim, otherwise the event namespace is prepended.
    pub fn on<F>(mut self, event: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.events.push((event.into(), Arc::new(handler)));
        self
    }

    pub fn on_error<F>(mut self, handler: F) -> Self
    where
        F: Fn(&BrokerError) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(handler));
        self
    }
}

/// Connection settings resolved from [`BrokerConfig`].
#[derive(Debug, Clone)]
pub struct BrokerSettings {
    /// Websocket base URL, or a full `/app/{key}` URL.
    pub url: String,
    pub app_key: String,
    pub event_namespace: String,
    pub reconnect_delay: Duration,
    pub max_reconnect_attempts: u32,
    pub activity_timeout: Duration,
}

impl BrokerSettings {
    pub fn from_config(config: &BrokerConfig) -> Self {
        let url = config.url.clone().unwrap_or_else(|| {
            let cluster = config.cluster.as_deref().unwrap_or(DEFAULT_CLUSTER);
            format!("wss://ws-{}.pusher.com:443", cluster)
        });

        Self {
            url,
            app_key: config.app_key.clone(),
            event_namespace: config
                .event_namespace
                .clone()
                .unwrap_or_else(|| DEFAULT_EVENT_NAMESPACE.to_string()),
            reconnect_delay: if config.reconnect_delay.is_zero() {
                DEFAULT_RECONNECT_DELAY
            } else {
                config.reconnect_delay
            },
            max_reconnect_attempts: config
                .max_reconnect_attempts
                .unwrap_or(DEFAULT_MAX_RECONNECT_ATTEMPTS),
            activity_timeout: DEFAULT_ACTIVITY_TIMEOUT,
        }
    }

    fn endpoint(&self) -> String {
        if self.url.contains("/app/") {
            return self.url.clone();
        }
        format!(
            "{}/app/{}?protocol=7&client=wallet-desk&version={}",
            self.url.trim_end_matches('/'),
            self.app_key,
            env!("CARGO_PKG_VERSION")
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JoinState {
    Idle,
    Joining,
    Joined,
}

struct Channel {
    private: bool,
    state: JoinState,
    handlers: HashMap<String, Vec<EventHandler>>,
    on_error: Vec<ErrorHandler>,
}

impl Channel {
    fn new(private: bool) -> Self {
        Self {
            private,
            state: JoinState::Idle,
            handlers: HashMap::new(),
            on_error: Vec::new(),
        }
    }
}

/// How one websocket session ended.
enum SessionEnd {
    Dropped { established: bool, reason: String },
    Fatal(String),
}

struct Shared {
    settings: BrokerSettings,
    authorizer: Option<Arc<dyn ChannelAuthorizer>>,
    status_tx: watch::Sender<ConnectionStatus>,
    failure: StdMutex<Option<String>>,
    listeners: Arc<Listeners>,
    next_listener: AtomicU64,
    channels: StdMutex<HashMap<String, Channel>>,
    socket_id: StdMutex<Option<String>>,
    sink: Mutex<Option<WsSink>>,
    task: StdMutex<Option<JoinHandle<()>>>,
}

/// Shared handle to the broker connection. Cloning is cheap.
#[derive(Clone)]
pub struct Broker {
    shared: Arc<Shared>,
}

impl Broker {
    pub fn new(settings: BrokerSettings, authorizer: Option<Arc<dyn ChannelAuthorizer>>) -> Self {
        let (status_tx, _) = watch::channel(ConnectionStatus::Idle);
        Self {
            shared: Arc::new(Shared {
                settings,
                authorizer,
                status_tx,
                failure: StdMutex::new(None),
                listeners: Arc::new(StdMutex::new(Vec::new())),
                next_listener: AtomicU64::new(0),
                channels: StdMutex::new(HashMap::new()),
                socket_id: StdMutex::new(None),
                sink: Mutex::new(None),
                task: StdMutex::new(None),
            }),
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.shared.status_tx.borrow()
    }

    /// Receiver for status changes, for async consumers.
    pub fn status_watch(&self) -> watch::Receiver<ConnectionStatus> {
        self.shared.status_tx.subscribe()
    }

    /// Reason of the last failure, if any.
    pub fn failure_reason(&self) -> Option<String> {
        lock(&self.shared.failure).clone()
    }

    pub fn socket_id(&self) -> Option<String> {
        lock(&self.shared.socket_id).clone()
    }

    /// Transport names of the registered channels.
    pub fn channels(&self) -> Vec<String> {
        let mut names: Vec<String> = lock(&self.shared.channels).keys().cloned().collect();
        names.sort();
        names
    }

    /// Opens the connection. No-op while connecting or connected.
    ///
    /// Fails with status `Failed` when the app key is missing or when no
    /// tokio runtime is available to drive the socket.
    pub fn connect(&self) -> Result<(), BrokerError> {
        if matches!(
            self.status(),
            ConnectionStatus::Connecting | ConnectionStatus::Connected
        ) {
            return Ok(());
        }

        if self.shared.settings.app_key.is_empty() {
            let err = BrokerError::MissingAppKey;
            self.shared.transition(TransportState::Failed, Some(err.to_string()));
            return Err(err);
        }

        let Ok(handle) = Handle::try_current() else {
            let err = BrokerError::NoRuntime;
            self.shared.transition(TransportState::Failed, Some(err.to_string()));
            return Err(err);
        };

        let mut task = lock(&self.shared.task);
        if matches!(
            self.status(),
            ConnectionStatus::Connecting | ConnectionStatus::Connected
        ) {
            return Ok(());
        }
        if let Some(previous) = task.take() {
            previous.abort();
        }

        self.shared.transition(TransportState::Connecting, None);
        let shared = Arc::clone(&self.shared);
        *task = Some(handle.spawn(async move { shared.run().await }));
        Ok(())
    }

    /// Joins a private channel, connecting lazily.
    pub async fn subscribe_private(
        &self,
        channel: &str,
        handlers: ChannelHandlers,
    ) -> Result<(), BrokerError> {
        self.subscribe_with(channel, handlers, true).await
    }

    /// Joins a public channel, connecting lazily.
    pub async fn subscribe(&self, channel: &str, handlers: ChannelHandlers) -> Result<(), BrokerError> {
        self.subscribe_with(channel, handlers, false).await
    }

    async fn subscribe_with(
        &self,
        channel: &str,
        handlers: ChannelHandlers,
        private: bool,
    ) -> Result<(), BrokerError> {
        let name = transport_channel(channel, private);
        {
            let namespace = &self.shared.settings.event_namespace;
            let mut channels = lock(&self.shared.channels);
            let entry = channels
                .entry(name.clone())
                .or_insert_with(|| Channel::new(private));
            for (event, handler) in handlers.events {
                entry
                    .handlers
                    .entry(qualify_event(&event, namespace))
                    .or_default()
                    .push(handler);
            }
            entry.on_error.extend(handlers.on_error);
        }
        debug!(channel = %name, "channel registered");

        if !matches!(
            self.status(),
            ConnectionStatus::Connecting | ConnectionStatus::Connected
        ) {
            // joined once the connection is established
            return self.connect();
        }

        let socket_id = self.socket_id();
        if let Some(socket_id) = socket_id {
            self.shared.join(&name, &socket_id).await;
        }
        Ok(())
    }

    /// Leaves both the plain and the private variant of a channel.
    pub async fn unsubscribe(&self, channel: &str) {
        let base = normalize_channel(channel);
        for name in [base.to_string(), transport_channel(base, true)] {
            let removed = lock(&self.shared.channels).remove(&name).is_some();
            if self.status().is_connected() {
                if let Err(e) = self.shared.send_text(protocol::unsubscribe_frame(&name)).await {
                    debug!(channel = %name, error = %e, "unsubscribe not sent");
                }
            }
            debug!(channel = %name, removed, "left channel");
        }
    }

    /// Registers a status listener. It is called immediately with the current
    /// status and then on every transition until the guard is dropped.
    pub fn on_connection_change<F>(&self, listener: F) -> ListenerGuard
    where
        F: Fn(ConnectionStatus) + Send + Sync + 'static,
    {
        let listener: Listener = Arc::new(listener);
        let id = self.shared.next_listener.fetch_add(1, Ordering::SeqCst);
        // Registered before the first call so no transition slips in between.
        let current = {
            let mut listeners = lock(&self.shared.listeners);
            listeners.push((id, Arc::clone(&listener)));
            self.status()
        };
        listener(current);

        ListenerGuard {
            id,
            listeners: Arc::downgrade(&self.shared.listeners),
        }
    }

    /// Full teardown: closes the socket and forgets every channel.
    pub async fn disconnect(&self) {
        let task = lock(&self.shared.task).take();
        if let Some(task) = task {
            task.abort();
        }

        let sink = self.shared.sink.lock().await.take();
        if let Some(mut sink) = sink {
            if let Err(e) = sink.close().await {
                debug!(error = %e, "failed to close broker socket");
            }
        }

        lock(&self.shared.channels).clear();
        *lock(&self.shared.socket_id) = None;
        self.shared.set_status(ConnectionStatus::Disconnected);
        info!("broker disconnected");
    }
}

/// Keeps a status listener registered; dropping it unregisters the listener.
#[must_use = "the listener is removed when the guard is dropped"]
pub struct ListenerGuard {
    id: u64,
    listeners: Weak<Listeners>,
}

impl ListenerGuard {
    pub fn cancel(self) {}
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        if let Some(listeners) = self.listeners.upgrade() {
            lock(&listeners).retain(|(id, _)| *id != self.id);
        }
    }
}

impl Shared {
    fn transition(&self, state: TransportState, reason: Option<String>) {
        match (&reason, state) {
            (Some(reason), _) => *lock(&self.failure) = Some(reason.clone()),
            (None, TransportState::Connected) => *lock(&self.failure) = None,
            _ => {}
        }
        self.set_status(state.status());
    }

    fn set_status(&self, status: ConnectionStatus) {
        let changed = self.status_tx.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
        if !changed {
            return;
        }

        info!(status = %status, "broker status changed");
        let listeners: Vec<Listener> = lock(&self.listeners)
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(status);
        }
    }

    /// Connection task: connect, read, reconnect with a fixed delay.
    async fn run(self: Arc<Self>) {
        let endpoint = self.settings.endpoint();
        let mut failures: u32 = 0;

        loop {
            self.transition(TransportState::Connecting, None);
            info!(url = %self.settings.url, "connecting to broker");

            let outcome = match connect_async(endpoint.as_str()).await {
                Ok((ws_stream, _response)) => {
                    let (sink, stream) = ws_stream.split();
                    *self.sink.lock().await = Some(sink);
                    let outcome = self.read_loop(stream).await;
                    self.reset_session().await;
                    outcome
                }
                Err(e) => {
                    warn!(error = %e, "broker connect failed");
                    SessionEnd::Dropped {
                        established: false,
                        reason: e.to_string(),
                    }
                }
            };

            let (established, reason) = match outcome {
                SessionEnd::Fatal(reason) => {
                    error!(reason = %reason, "broker refused the connection");
                    self.transition(TransportState::Failed, Some(reason));
                    return;
                }
                SessionEnd::Dropped {
                    established,
                    reason,
                } => (established, reason),
            };

            if established {
                failures = 0;
            }
            failures += 1;
            if failures > self.settings.max_reconnect_attempts {
                let reason = format!("broker unreachable after {} attempts: {}", failures, reason);
                error!(reason = %reason, "giving up on broker");
                self.transition(TransportState::Failed, Some(reason));
                return;
            }

            let state = if established {
                TransportState::Disconnected
            } else {
                TransportState::Unavailable
            };
            self.transition(state, None);
            info!(delay = ?self.settings.reconnect_delay, attempt = failures, "reconnecting to broker");
            tokio::time::sleep(self.settings.reconnect_delay).await;
        }
    }

    async fn read_loop(&self, mut stream: WsSource) -> SessionEnd {
        let mut established = false;
        let mut activity = self.settings.activity_timeout;
        let mut awaiting_pong = false;

        loop {
            let idle = if awaiting_pong { PONG_TIMEOUT } else { activity };

            tokio::select! {
                msg = stream.next() => {
                    awaiting_pong = false;
                    match msg {
                        Some(Ok(WsMessage::Text(text))) => match parse_frame(&text) {
                            Some(Frame::ConnectionEstablished { socket_id, activity_timeout }) => {
                                established = true;
                                if let Some(secs) = activity_timeout {
                                    activity = Duration::from_secs(secs.max(1)).min(self.settings.activity_timeout);
                                }
                                info!(socket_id = %socket_id, "broker connection established");
                                *lock(&self.socket_id) = Some(socket_id.clone());
                                self.transition(TransportState::Connected, None);
                                self.resubscribe(&socket_id).await;
                            }
                            Some(Frame::Error { code: Some(code), message }) if is_fatal_code(code) => {
                                return SessionEnd::Fatal(format!("broker error {}: {}", code, message));
                            }
                            Some(frame) => self.handle_frame(frame).await,
                            None => debug!(frame = %text.as_str(), "ignored broker frame"),
                        },
                        Some(Ok(WsMessage::Close(frame))) => {
                            if let Some(frame) = frame {
                                let code = u16::from(frame.code);
                                if is_fatal_code(code) {
                                    return SessionEnd::Fatal(format!("broker closed with {}: {}", code, frame.reason.as_str()));
                                }
                            }
                            info!("broker closed the connection");
                            return SessionEnd::Dropped { established, reason: "closed by server".to_string() };
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            warn!(error = %e, "broker read error");
                            self.transition(TransportState::Error, Some(e.to_string()));
                            return SessionEnd::Dropped { established, reason: e.to_string() };
                        }
                        None => {
                            info!("broker stream ended");
                            return SessionEnd::Dropped { established, reason: "stream ended".to_string() };
                        }
                    }
                }
                _ = tokio::time::sleep(idle) => {
                    if awaiting_pong {
                        warn!("no pong from broker");
                        return SessionEnd::Dropped { established, reason: "pong timeout".to_string() };
                    }
                    if let Err(e) = self.send_text(protocol::ping_frame()).await {
                        return SessionEnd::Dropped { established, reason: e.to_string() };
                    }
                    debug!("ping sent");
                    awaiting_pong = true;
                }
            }
        }
    }

    async fn handle_frame(&self, frame: Frame) {
        match frame {
            Frame::Ping => {
                if let Err(e) = self.send_text(protocol::pong_frame()).await {
                    warn!(error = %e, "pong failed");
                }
            }
            Frame::Pong => debug!("pong received"),
            Frame::SubscriptionSucceeded { channel } => {
                if let Some(entry) = lock(&self.channels).get_mut(&channel) {
                    entry.state = JoinState::Joined;
                }
                info!(channel = %channel, "subscribed");
            }
            Frame::SubscriptionError {
                channel,
                status,
                error,
            } => {
                let channel = channel.unwrap_or_default();
                warn!(channel = %channel, status = ?status, error = %error, "subscription rejected");
                if let Some(entry) = lock(&self.channels).get_mut(&channel) {
                    entry.state = JoinState::Idle;
                }
                self.report(
                    &channel,
                    BrokerError::Subscription {
                        channel: channel.clone(),
                        reason: error,
                    },
                );
            }
            Frame::Error { code, message } => {
                warn!(code = ?code, message = %message, "broker error");
            }
            Frame::Event {
                channel,
                event,
                data,
            } => self.dispatch(&channel, &event, &data),
            Frame::ConnectionEstablished { .. } => {}
        }
    }

    fn dispatch(&self, channel: &str, event: &str, data: &Value) {
        let handlers: Vec<EventHandler> = lock(&self.channels)
            .get(channel)
            .and_then(|entry| entry.handlers.get(event))
            .map(|handlers| handlers.iter().map(Arc::clone).collect())
            .unwrap_or_default();

        if handlers.is_empty() {
            debug!(channel = %channel, event = %event, "no handler for event");
            return;
        }
        for handler in handlers {
            handler(data);
        }
    }

    /// Delivers a channel failure to its error handlers; the connection stays up.
    fn report(&self, channel: &str, err: BrokerError) {
        let handlers: Vec<ErrorHandler> = lock(&self.channels)
            .get(channel)
            .map(|entry| entry.on_error.iter().map(Arc::clone).collect())
            .unwrap_or_default();

        if handlers.is_empty() {
            warn!(channel = %channel, error = %err, "unhandled channel error");
        }
        for handler in handlers {
            handler(&err);
        }
    }

    async fn resubscribe(&self, socket_id: &str) {
        let names: Vec<String> = lock(&self.channels).keys().cloned().collect();
        for name in names {
            self.join(&name, socket_id).await;
        }
    }

    /// Marks an idle channel as joining; returns whether it is private.
    fn claim_join(&self, channel: &str) -> Option<bool> {
        let mut channels = lock(&self.channels);
        let entry = channels.get_mut(channel)?;
        if entry.state != JoinState::Idle {
            return None;
        }
        entry.state = JoinState::Joining;
        Some(entry.private)
    }

    fn release_join(&self, channel: &str) {
        if let Some(entry) = lock(&self.channels).get_mut(channel) {
            entry.state = JoinState::Idle;
        }
    }

    async fn join(&self, channel: &str, socket_id: &str) {
        let Some(private) = self.claim_join(channel) else {
            return;
        };

        let auth = if private {
            let Some(authorizer) = &self.authorizer else {
                self.release_join(channel);
                self.report(
                    channel,
                    BrokerError::Authorization {
                        channel: channel.to_string(),
                        reason: "no channel authorizer configured".to_string(),
                    },
                );
                return;
            };
            match authorizer.authorize(socket_id, channel).await {
                Ok(auth) => Some(auth),
                Err(e) => {
                    warn!(channel = %channel, error = %e, "channel authorization failed");
                    self.release_join(channel);
                    self.report(channel, e);
                    return;
                }
            }
        } else {
            None
        };

        let frame = protocol::subscribe_frame(
            channel,
            auth.as_ref().map(|a| a.auth.as_str()),
            auth.as_ref().and_then(|a| a.channel_data.as_deref()),
        );
        match self.send_text(frame).await {
            Ok(()) => debug!(channel = %channel, "subscribe sent"),
            Err(e) => {
                warn!(channel = %channel, error = %e, "subscribe not sent");
                self.release_join(channel);
            }
        }
    }

    async fn send_text(&self, text: String) -> Result<(), BrokerError> {
        let mut guard = self.sink.lock().await;
        let sink = guard.as_mut().ok_or(BrokerError::NotConnected)?;
        sink.send(WsMessage::Text(text.into())).await?;
        Ok(())
    }

    async fn reset_session(&self) {
        if let Some(mut sink) = self.sink.lock().await.take() {
            let _ = sink.close().await;
        }
        *lock(&self.socket_id) = None;
        for entry in lock(&self.channels).values_mut() {
            entry.state = JoinState::Idle;
        }
    }
}
