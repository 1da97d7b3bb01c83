use serde_json::Value;

/// Channel events as seen by the bridge worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    ChatMessage {
        message_id: Option<String>,
        sender_id: Option<String>,
    },
    ChatRead,
    NotificationReceived,
    UserUpdated,
}

impl Signal {
    /// Reads a `.message.sent` payload, either flat or wrapped in `message`.
    pub fn chat_message(payload: &Value) -> Self {
        let message = payload.get("message").filter(|m| m.is_object()).unwrap_or(payload);
        Signal::ChatMessage {
            message_id: id_field(message, &["id", "message_id"]),
            sender_id: id_field(message, &["sender_id", "user_id", "from_id"]),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Signal::ChatMessage { .. } => "chat_message",
            Signal::ChatRead => "chat_read",
            Signal::NotificationReceived => "notification",
            Signal::UserUpdated => "user_updated",
        }
    }
}

fn id_field(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match value.get(*key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}
