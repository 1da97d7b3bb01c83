use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::config::NotificationConfig;
use crate::domain::Notification;
use crate::realtime::ConnectionStatus;

/// Kind of user-facing alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    /// Audible cue for an inbound chat message
    Sound,
    /// Transient message about a request outcome
    Toast,
    /// The first-unread notification banner
    Banner,
    /// Realtime connection status changed
    Connection,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventType::Sound => write!(f, "sound"),
            EventType::Toast => write!(f, "toast"),
            EventType::Banner => write!(f, "banner"),
            EventType::Connection => write!(f, "connection"),
        }
    }
}

/// Severity of a toast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastLevel {
    Success,
    Info,
    Error,
}

impl fmt::Display for ToastLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToastLevel::Success => write!(f, "success"),
            ToastLevel::Info => write!(f, "info"),
            ToastLevel::Error => write!(f, "error"),
        }
    }
}

/// A chat message that deserves a sound cue.
#[derive(Debug, Clone, PartialEq)]
pub struct SoundData {
    pub message_id: Option<String>,
    pub sender_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToastData {
    pub level: ToastLevel,
    pub title: String,
    pub message: String,
    /// Secondary line, only when it differs from `message`.
    pub description: Option<String>,
}

/// Banner contents; `None` clears the banner.
#[derive(Debug, Clone, PartialEq)]
pub struct BannerData {
    pub notification: Option<Notification>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionData {
    pub status: ConnectionStatus,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventData {
    Sound(SoundData),
    Toast(ToastData),
    Banner(BannerData),
    Connection(ConnectionData),
}

/// Alert for the UI layer.
#[derive(Debug, Clone)]
pub struct Event {
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub data: EventData,
}

impl Event {
    pub fn new(event_type: EventType, data: EventData) -> Self {
        Self {
            event_type,
            timestamp: Utc::now(),
            data,
        }
    }

    pub fn sound(data: SoundData) -> Self {
        Self::new(EventType::Sound, EventData::Sound(data))
    }

    pub fn toast(data: ToastData) -> Self {
        Self::new(EventType::Toast, EventData::Toast(data))
    }

    pub fn banner(notification: Option<Notification>) -> Self {
        Self::new(EventType::Banner, EventData::Banner(BannerData { notification }))
    }

    pub fn connection(status: ConnectionStatus, reason: Option<String>) -> Self {
        Self::new(
            EventType::Connection,
            EventData::Connection(ConnectionData { status, reason }),
        )
    }

    /// Toast for a successful user action.
    pub fn success(title: impl Into<String>, message: impl Into<String>, description: Option<String>) -> Self {
        Self::toast(ToastData {
            level: ToastLevel::Success,
            title: title.into(),
            message: message.into(),
            description,
        })
    }

    /// Toast for a failed user action.
    pub fn failure(title: impl Into<String>, message: impl Into<String>, description: Option<String>) -> Self {
        Self::toast(ToastData {
            level: ToastLevel::Error,
            title: title.into(),
            message: message.into(),
            description,
        })
    }
}

/// Sink for user-facing alerts.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    /// Delivers the event and waits for the sink to accept it.
    async fn send(&self, event: &Event) -> Result<(), NotificationError>;

    /// Delivers the event without waiting.
    fn send_async(&self, event: Event);

    /// Whether this sink wants events of the given type.
    fn is_enabled(&self, event_type: EventType) -> bool;

    async fn close(&self) -> Result<(), NotificationError>;
}

#[derive(Debug, Clone)]
pub struct NotificationError {
    pub message: String,
}

impl fmt::Display for NotificationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NotificationError: {}", self.message)
    }
}

impl std::error::Error for NotificationError {}

impl NotificationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Which event types a sink accepts, from the `notification` config section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventFilter {
    pub sound: bool,
    pub toast: bool,
    pub banner: bool,
}

impl EventFilter {
    pub fn all() -> Self {
        Self {
            sound: true,
            toast: true,
            banner: true,
        }
    }

    pub fn from_config(config: &NotificationConfig) -> Self {
        Self {
            sound: config.chat_sound,
            toast: config.toasts,
            banner: config.banners,
        }
    }

    pub fn allows(&self, event_type: EventType) -> bool {
        match event_type {
            EventType::Sound => self.sound,
            EventType::Toast => self.toast,
            EventType::Banner => self.banner,
            EventType::Connection => true,
        }
    }
}

impl Default for EventFilter {
    fn default() -> Self {
        Self::all()
    }
}

/// Fans events out to several sinks.
pub struct MultiNotifier {
    notifiers: Vec<Arc<dyn Notifier>>,
}

impl MultiNotifier {
    pub fn new(notifiers: Vec<Arc<dyn Notifier>>) -> Self {
        Self { notifiers }
    }
}

#[async_trait::async_trait]
impl Notifier for MultiNotifier {
    async fn send(&self, event: &Event) -> Result<(), NotificationError> {
        let mut errors = Vec::new();
        for notifier in &self.notifiers {
            if notifier.is_enabled(event.event_type) {
                if let Err(e) = notifier.send(event).await {
                    errors.push(e.message);
                }
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(NotificationError::new(errors.join("; ")))
        }
    }

    fn send_async(&self, event: Event) {
        for notifier in &self.notifiers {
            if notifier.is_enabled(event.event_type) {
                notifier.send_async(event.clone());
            }
        }
    }

    fn is_enabled(&self, event_type: EventType) -> bool {
        self.notifiers.iter().any(|n| n.is_enabled(event_type))
    }

    async fn close(&self) -> Result<(), NotificationError> {
        let mut errors = Vec::new();
        for notifier in &self.notifiers {
            if let Err(e) = notifier.close().await {
                errors.push(e.message);
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(NotificationError::new(errors.join("; ")))
        }
    }
}

/// Discards everything.
pub struct NoopNotifier;

impl NoopNotifier {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NoopNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Notifier for NoopNotifier {
    async fn send(&self, _event: &Event) -> Result<(), NotificationError> {
        Ok(())
    }

    fn send_async(&self, _event: Event) {}

    fn is_enabled(&self, _event_type: EventType) -> bool {
        false
    }

    async fn close(&self) -> Result<(), NotificationError> {
        Ok(())
    }
}

// === Formatting ===

pub fn format_sound(data: &SoundData) -> String {
    match &data.sender_id {
        Some(sender) => format!("New chat message from {}", sender),
        None => "New chat message".to_string(),
    }
}

pub fn format_toast(data: &ToastData) -> String {
    let mut text = format!("[{}] {}: {}", data.level, data.title, data.message);
    if let Some(description) = &data.description {
        text.push_str(" (");
        text.push_str(description);
        text.push(')');
    }
    text
}

pub fn format_banner(data: &BannerData) -> String {
    let Some(notification) = &data.notification else {
        return "Banner cleared".to_string();
    };
    match (&notification.title, &notification.message) {
        (Some(title), Some(message)) => format!("{}: {}", title, truncate(message, MAX_BANNER_LENGTH)),
        (Some(title), None) => title.clone(),
        (None, Some(message)) => truncate(message, MAX_BANNER_LENGTH),
        (None, None) => format!("Notification #{}", notification.id),
    }
}

pub fn format_connection(data: &ConnectionData) -> String {
    match &data.reason {
        Some(reason) if data.status == ConnectionStatus::Failed => {
            format!("Realtime updates {}: {}", data.status, reason)
        }
        _ => format!("Realtime updates {}", data.status),
    }
}

pub fn format_event(event: &Event) -> String {
    match &event.data {
        EventData::Sound(data) => format_sound(data),
        EventData::Toast(data) => format_toast(data),
        EventData::Banner(data) => format_banner(data),
        EventData::Connection(data) => format_connection(data),
    }
}

const MAX_BANNER_LENGTH: usize = 140;

/// Cuts at a char boundary and appends an ellipsis.
fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    out.push('…');
    out
}

/// Formats an uptime like `2m 5s`.
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs < 86400 {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    } else {
        format!("{}d {}h", secs / 86400, (secs % 86400) / 3600)
    }
}

#[cfg(test)]
#[path = "tests.rs"]
mod tests;
