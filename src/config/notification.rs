//! Notification settings.

use serde::Deserialize;

/// Alert sink settings.
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationConfig {
    /// Play a sound cue for inbound chat messages.
    #[serde(default = "enabled")]
    pub chat_sound: bool,
    /// Show toasts for request outcomes.
    #[serde(default = "enabled")]
    pub toasts: bool,
    /// Show the first-unread notification banner.
    #[serde(default = "enabled")]
    pub banners: bool,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            chat_sound: true,
            toasts: true,
            banners: true,
        }
    }
}

fn enabled() -> bool {
    true
}
