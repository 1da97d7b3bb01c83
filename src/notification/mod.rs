//! User-facing alerts: sound cues, toasts, the unread banner and connection notices.

mod notifier;
mod sinks;

pub use notifier::{
    BannerData, ConnectionData, Event, EventData, EventFilter, EventType, MultiNotifier,
    NoopNotifier, NotificationError, Notifier, SoundData, ToastData, ToastLevel, format_banner,
    format_connection, format_duration, format_event, format_sound, format_toast,
};
pub use sinks::{ChannelNotifier, LogNotifier};
