//! Concrete alert sinks: tracing output and an in-process queue for the UI.

use tokio::sync::mpsc;
use tracing::{info, warn};

use super::{
    Event, EventData, EventFilter, EventType, NotificationError, Notifier, ToastLevel, format_event,
};

/// Writes every event to the log.
pub struct LogNotifier {
    filter: EventFilter,
}

impl LogNotifier {
    pub fn new(filter: EventFilter) -> Self {
        Self { filter }
    }

    fn emit(&self, event: &Event) {
        let text = format_event(event);
        match &event.data {
            EventData::Toast(toast) if toast.level == ToastLevel::Error => {
                warn!(kind = %event.event_type, "{}", text)
            }
            _ => info!(kind = %event.event_type, "{}", text),
        }
    }
}

#[async_trait::async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, event: &Event) -> Result<(), NotificationError> {
        if self.is_enabled(event.event_type) {
            self.emit(event);
        }
        Ok(())
    }

    fn send_async(&self, event: Event) {
        if self.is_enabled(event.event_type) {
            self.emit(&event);
        }
    }

    fn is_enabled(&self, event_type: EventType) -> bool {
        self.filter.allows(event_type)
    }

    async fn close(&self) -> Result<(), NotificationError> {
        Ok(())
    }
}

/// Queues events for a UI consumer.
pub struct ChannelNotifier {
    filter: EventFilter,
    sender: mpsc::UnboundedSender<Event>,
}

impl ChannelNotifier {
    pub fn new(filter: EventFilter) -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { filter, sender }, receiver)
    }
}

#[async_trait::async_trait]
impl Notifier for ChannelNotifier {
    async fn send(&self, event: &Event) -> Result<(), NotificationError> {
        if !self.is_enabled(event.event_type) {
            return Ok(());
        }
        self.sender
            .send(event.clone())
            .map_err(|_| NotificationError::new("event consumer is gone"))
    }

    fn send_async(&self, event: Event) {
        if !self.is_enabled(event.event_type) {
            return;
        }
        if self.sender.send(event).is_err() {
            warn!("event consumer is gone, alert dropped");
        }
    }

    fn is_enabled(&self, event_type: EventType) -> bool {
        self.filter.allows(event_type)
    }

    async fn close(&self) -> Result<(), NotificationError> {
        Ok(())
    }
}
