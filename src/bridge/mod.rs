//! Delivers realtime notification and chat events to the UI.
//!
//! Broker handlers only enqueue a [`Signal`]; a single worker task performs
//! the side effects (refetches, sound cues, unread counts) in arrival order.

mod error;
mod signal;

pub use error::BridgeError;
pub use signal::Signal;

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::{ApiError, Attachment, ChatQuery};
use crate::domain::{ChatMessage, Notification};
use crate::lifecycle::SessionStore;
use crate::notification::{Event, Notifier, SoundData};
use crate::polling::{PollError, Refresh};
use crate::realtime::{Broker, ChannelHandlers};

/// Message ids remembered for duplicate suppression before the set is reset.
const MAX_SEEN_MESSAGES: usize = 1024;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn user_channel(user_id: &str) -> String {
    format!("user.{}", user_id)
}

fn chat_channel(user_id: &str) -> String {
    format!("chat.{}", user_id)
}

pub struct NotificationBridge {
    session: Arc<SessionStore>,
    broker: Broker,
    notifier: Arc<dyn Notifier>,
    subscribed: Mutex<HashSet<String>>,
    signal_tx: Mutex<Option<mpsc::UnboundedSender<Signal>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    chat_open: AtomicBool,
    unread_tx: watch::Sender<u32>,
    dismissed: Mutex<HashSet<String>>,
    seen_messages: Mutex<HashSet<String>>,
    history: Mutex<Vec<ChatMessage>>,
    signals: AtomicU64,
}

impl NotificationBridge {
    pub fn new(session: Arc<SessionStore>, broker: Broker, notifier: Arc<dyn Notifier>) -> Self {
        let (unread_tx, _) = watch::channel(0);
        Self {
            session,
            broker,
            notifier,
            subscribed: Mutex::new(HashSet::new()),
            signal_tx: Mutex::new(None),
            worker: Mutex::new(None),
            chat_open: AtomicBool::new(false),
            unread_tx,
            dismissed: Mutex::new(HashSet::new()),
            seen_messages: Mutex::new(HashSet::new()),
            history: Mutex::new(Vec::new()),
            signals: AtomicU64::new(0),
        }
    }

    /// Joins the user and chat channels of the current user, each at most once.
    ///
    /// Returns the number of channels joined by this call. Channels stay
    /// registered with the broker when the connection fails, so they are
    /// joined as soon as it comes back.
    pub async fn attach(self: &Arc<Self>) -> usize {
        let Some(user_id) = self.session.user_id() else {
            debug!("no user yet, bridge not attached");
            return 0;
        };
        let tx = self.start_worker();

        let mut joined = 0;
        for channel in [user_channel(&user_id), chat_channel(&user_id)] {
            if !lock(&self.subscribed).insert(channel.clone()) {
                continue;
            }
            let handlers = if channel.starts_with("chat.") {
                chat_handlers(&channel, &tx)
            } else {
                user_handlers(&channel, &tx)
            };
            if let Err(e) = self.broker.subscribe_private(&channel, handlers).await {
                warn!(channel = %channel, error = %e, "realtime unavailable, relying on polling");
            }
            info!(channel = %channel, "bridge channel attached");
            joined += 1;
        }
        joined
    }

    /// Leaves every joined channel and stops the worker.
    pub async fn detach(&self) {
        let channels: Vec<String> = lock(&self.subscribed).drain().collect();
        for channel in channels {
            self.broker.unsubscribe(&channel).await;
        }
        lock(&self.signal_tx).take();
        if let Some(worker) = lock(&self.worker).take() {
            worker.abort();
        }
        lock(&self.seen_messages).clear();
        debug!("bridge detached");
    }

    pub fn channels(&self) -> Vec<String> {
        let mut channels: Vec<String> = lock(&self.subscribed).iter().cloned().collect();
        channels.sort();
        channels
    }

    fn start_worker(self: &Arc<Self>) -> mpsc::UnboundedSender<Signal> {
        let mut slot = lock(&self.signal_tx);
        if let Some(tx) = slot.as_ref() {
            return tx.clone();
        }
        let (tx, mut rx) = mpsc::unbounded_channel();
        let bridge = Arc::clone(self);
        let worker = tokio::spawn(async move {
            while let Some(signal) = rx.recv().await {
                bridge.process(signal).await;
            }
        });
        *lock(&self.worker) = Some(worker);
        *slot = Some(tx.clone());
        tx
    }

    /// Number of signals processed so far.
    pub fn signals(&self) -> u64 {
        self.signals.load(Ordering::Relaxed)
    }

    /// Performs the side effects of one signal.
    pub async fn process(&self, signal: Signal) {
        self.signals.fetch_add(1, Ordering::Relaxed);
        debug!(signal = signal.name(), "processing signal");
        match signal {
            Signal::ChatMessage {
                message_id,
                sender_id,
            } => {
                let own = sender_id.is_some() && sender_id == self.session.user_id();
                if own || self.is_chat_open() {
                    debug!(own, "chat message needs no alert");
                    return;
                }
                if let Some(id) = &message_id {
                    if !self.remember_message(id) {
                        debug!(message_id = %id, "duplicate chat message");
                        return;
                    }
                }
                self.notifier.send_async(Event::sound(SoundData {
                    message_id,
                    sender_id,
                }));
                if let Err(e) = self.refresh_unread().await {
                    warn!(error = %e, "failed to refresh unread count");
                }
            }
            Signal::ChatRead => {
                if let Err(e) = self.refresh_unread().await {
                    warn!(error = %e, "failed to refresh unread count");
                }
            }
            Signal::NotificationReceived | Signal::UserUpdated => {
                if let Err(e) = self.session.refresh().await {
                    warn!(error = %e, "failed to refresh user after event");
                    return;
                }
                self.notifier.send_async(Event::banner(self.first_unread()));
            }
        }
    }

    /// The banner notification: first unread one that is not being dismissed.
    pub fn first_unread(&self) -> Option<Notification> {
        let snapshot = self.session.snapshot();
        let dismissed = lock(&self.dismissed);
        snapshot
            .notifications
            .iter()
            .find(|n| n.is_unread() && !dismissed.contains(&n.id))
            .cloned()
    }

    /// Hides the notification now and persists the read mark in the background.
    ///
    /// The optimistic override is dropped once the refetched snapshot is in.
    pub fn mark_read(self: &Arc<Self>, id: &str) -> JoinHandle<()> {
        lock(&self.dismissed).insert(id.to_string());
        self.notifier.send_async(Event::banner(self.first_unread()));

        let bridge = Arc::clone(self);
        let id = id.to_string();
        tokio::spawn(async move {
            if let Err(e) = bridge.session.api().mark_notification_read(&id).await {
                warn!(notification = %id, error = %e, "failed to mark notification read");
            }
            if let Err(e) = bridge.session.refresh().await {
                debug!(error = %e, "refetch after mark read failed");
            }
            lock(&bridge.dismissed).remove(&id);
            bridge.notifier.send_async(Event::banner(bridge.first_unread()));
        })
    }

    pub fn is_chat_open(&self) -> bool {
        self.chat_open.load(Ordering::Acquire)
    }

    /// The chat surface is visible; the unread counter reads zero.
    pub fn open_chat(&self) {
        self.chat_open.store(true, Ordering::Release);
        self.unread_tx.send_replace(0);
    }

    pub fn close_chat(&self) {
        self.chat_open.store(false, Ordering::Release);
    }

    pub fn unread_count(&self) -> u32 {
        *self.unread_tx.borrow()
    }

    pub fn unread_watch(&self) -> watch::Receiver<u32> {
        self.unread_tx.subscribe()
    }

    /// Fetches the unread count; it is applied only while chat is closed.
    pub async fn refresh_unread(&self) -> Result<u32, ApiError> {
        let count = self.session.api().chat_unread_count().await?;
        if !self.is_chat_open() {
            self.unread_tx.send_replace(count);
        }
        Ok(self.unread_count())
    }

    /// Loaded chat history, oldest first.
    pub fn messages(&self) -> Vec<ChatMessage> {
        lock(&self.history).clone()
    }

    /// Loads one page of history; returns whether more pages exist.
    pub async fn load_messages(&self, page: u32) -> Result<bool, BridgeError> {
        let page = self.session.api().chat_messages(&ChatQuery::page(page)).await?;
        self.merge(page.data.clone());
        Ok(page.has_more())
    }

    /// Fetches messages newer than the newest one loaded; returns how many were new.
    pub async fn poll_messages(&self) -> Result<usize, BridgeError> {
        let after = lock(&self.history)
            .iter()
            .filter_map(|m| m.created_at.clone())
            .max();
        let query = match after {
            Some(after) => ChatQuery::after(after),
            None => ChatQuery::page(1),
        };
        let page = self.session.api().chat_messages(&query).await?;
        Ok(self.merge(page.data))
    }

    pub async fn send_message(&self, body: &str) -> Result<ChatMessage, BridgeError> {
        let body = body.trim();
        if body.is_empty() {
            return Err(BridgeError::EmptyMessage);
        }
        let message = self.session.api().send_chat_message(body).await?;
        self.merge(vec![message.clone()]);
        Ok(message)
    }

    pub async fn upload_attachment(&self, attachment: Attachment) -> Result<ChatMessage, BridgeError> {
        let name = attachment.file_name.clone();
        let message = self.session.api().upload_chat_attachment(attachment).await?;
        debug!(file = %name, message_id = %message.id, "attachment uploaded");
        self.merge(vec![message.clone()]);
        Ok(message)
    }

    /// Records a message id; false when it was already seen.
    fn remember_message(&self, id: &str) -> bool {
        let mut seen = lock(&self.seen_messages);
        if seen.contains(id) {
            return false;
        }
        if seen.len() >= MAX_SEEN_MESSAGES {
            seen.clear();
        }
        seen.insert(id.to_string())
    }

    /// Adds messages not seen before (by id); returns how many were added.
    fn merge(&self, messages: Vec<ChatMessage>) -> usize {
        let mut history = lock(&self.history);
        let mut added = 0;
        for message in messages {
            if history.iter().any(|m| m.id == message.id) {
                continue;
            }
            self.remember_message(&message.id);
            history.push(message);
            added += 1;
        }
        if added > 0 {
            history.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        }
        added
    }
}

fn user_handlers(channel: &str, tx: &mpsc::UnboundedSender<Signal>) -> ChannelHandlers {
    let notification_tx = tx.clone();
    let updated_tx = tx.clone();
    let name = channel.to_string();
    ChannelHandlers::new()
        .on(".notification.message", move |_| {
            let _ = notification_tx.send(Signal::NotificationReceived);
        })
        .on(".user.updated", move |_| {
            let _ = updated_tx.send(Signal::UserUpdated);
        })
        .on_error(move |e| warn!(channel = %name, error = %e, "user channel error"))
}

fn chat_handlers(channel: &str, tx: &mpsc::UnboundedSender<Signal>) -> ChannelHandlers {
    let sent_tx = tx.clone();
    let read_tx = tx.clone();
    let name = channel.to_string();
    ChannelHandlers::new()
        .on(".message.sent", move |payload| {
            let _ = sent_tx.send(Signal::chat_message(payload));
        })
        .on(".message.read", move |_| {
            let _ = read_tx.send(Signal::ChatRead);
        })
        .on_error(move |e| warn!(channel = %name, error = %e, "chat channel error"))
}

/// Unread-count poller target.
#[async_trait]
impl Refresh for NotificationBridge {
    async fn refresh(&self) -> Result<(), PollError> {
        self.refresh_unread().await?;
        Ok(())
    }
}
