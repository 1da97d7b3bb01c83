//! User notifications and chat messages.

use serde::Deserialize;

use super::lenient;

/// A notification from the user's notification list.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Notification {
    #[serde(with = "lenient::id")]
    pub id: String,
    #[serde(default, with = "lenient::text")]
    pub title: Option<String>,
    #[serde(default, alias = "body", with = "lenient::text")]
    pub message: Option<String>,
    #[serde(default, with = "lenient::text")]
    pub read_at: Option<String>,
    #[serde(default, with = "lenient::flag")]
    pub read: Option<bool>,
    #[serde(default, with = "lenient::text")]
    pub created_at: Option<String>,
}

impl Notification {
    /// Unread means no read timestamp and no explicit read flag.
    pub fn is_unread(&self) -> bool {
        self.read_at.is_none() && self.read != Some(true)
    }
}

/// A chat message between the user and support.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChatMessage {
    #[serde(with = "lenient::id")]
    pub id: String,
    #[serde(default, alias = "user_id", with = "lenient::opt_id")]
    pub sender_id: Option<String>,
    #[serde(default, alias = "message", with = "lenient::text")]
    pub body: Option<String>,
    #[serde(default, with = "lenient::text")]
    pub attachment_url: Option<String>,
    #[serde(default, with = "lenient::text")]
    pub created_at: Option<String>,
    #[serde(default, with = "lenient::text")]
    pub read_at: Option<String>,
}

/// One page of chat history.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ChatPage {
    #[serde(default)]
    pub data: Vec<ChatMessage>,
    #[serde(default, with = "lenient::count")]
    pub current_page: Option<u32>,
    #[serde(default, with = "lenient::count")]
    pub last_page: Option<u32>,
}

impl ChatPage {
    /// True when the server reports more pages after this one.
    pub fn has_more(&self) -> bool {
        match (self.current_page, self.last_page) {
            (Some(current), Some(last)) => current < last,
            _ => false,
        }
    }
}
