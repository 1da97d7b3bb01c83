//! Pusher channel protocol (version 7) frames and naming rules.

use serde_json::{Value, json};

/// Prefix the broker uses for channels that need authorization.
pub const PRIVATE_PREFIX: &str = "private-";

/// Default namespace for event names that are not written verbatim.
pub const DEFAULT_EVENT_NAMESPACE: &str = "App\\Events";

/// Inbound frame from the broker.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    ConnectionEstablished {
        socket_id: String,
        activity_timeout: Option<u64>,
    },
    SubscriptionSucceeded {
        channel: String,
    },
    SubscriptionError {
        channel: Option<String>,
        status: Option<u16>,
        error: String,
    },
    Error {
        code: Option<u16>,
        message: String,
    },
    Ping,
    Pong,
    Event {
        channel: String,
        event: String,
        data: Value,
    },
}

/// Parses a text frame. Unknown or malformed frames yield `None`.
pub fn parse_frame(text: &str) -> Option<Frame> {
    let value: Value = serde_json::from_str(text).ok()?;
    let event = value.get("event")?.as_str()?.to_string();
    let channel = value
        .get("channel")
        .and_then(Value::as_str)
        .map(str::to_string);
    let data = decode_data(value.get("data"));

    let frame = match event.as_str() {
        "pusher:connection_established" => Frame::ConnectionEstablished {
            socket_id: data.get("socket_id")?.as_str()?.to_string(),
            activity_timeout: data.get("activity_timeout").and_then(Value::as_u64),
        },
        "pusher_internal:subscription_succeeded" => Frame::SubscriptionSucceeded { channel: channel? },
        "pusher:subscription_error" => Frame::SubscriptionError {
            channel,
            status: data
                .get("status")
                .and_then(Value::as_u64)
                .and_then(|s| u16::try_from(s).ok()),
            error: data
                .get("error")
                .and_then(Value::as_str)
                .or_else(|| data.as_str())
                .unwrap_or("subscription rejected")
                .to_string(),
        },
        "pusher:error" => Frame::Error {
            code: data
                .get("code")
                .and_then(Value::as_u64)
                .and_then(|c| u16::try_from(c).ok()),
            message: data
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown broker error")
                .to_string(),
        },
        "pusher:ping" => Frame::Ping,
        "pusher:pong" => Frame::Pong,
        _ if event.starts_with("pusher") => return None,
        _ => Frame::Event {
            channel: channel?,
            event,
            data,
        },
    };
    Some(frame)
}

/// The broker double-encodes `data` as a JSON string; accept both forms.
fn decode_data(data: Option<&Value>) -> Value {
    match data {
        Some(Value::String(s)) => serde_json::from_str(s).unwrap_or_else(|_| Value::String(s.clone())),
        Some(other) => other.clone(),
        None => Value::Null,
    }
}

pub fn subscribe_frame(channel: &str, auth: Option<&str>, channel_data: Option<&str>) -> String {
    let mut data = json!({ "channel": channel });
    if let Some(auth) = auth {
        data["auth"] = json!(auth);
    }
    if let Some(channel_data) = channel_data {
        data["channel_data"] = json!(channel_data);
    }
    json!({ "event": "pusher:subscribe", "data": data }).to_string()
}

pub fn unsubscribe_frame(channel: &str) -> String {
    json!({ "event": "pusher:unsubscribe", "data": { "channel": channel } }).to_string()
}

pub fn ping_frame() -> String {
    json!({ "event": "pusher:ping", "data": {} }).to_string()
}

pub fn pong_frame() -> String {
    json!({ "event": "pusher:pong", "data": {} }).to_string()
}

/// Strips the private prefix so callers may pass either form.
pub fn normalize_channel(name: &str) -> &str {
    name.strip_prefix(PRIVATE_PREFIX).unwrap_or(name)
}

/// Name used on the wire for a normalized channel.
pub fn transport_channel(name: &str, private: bool) -> String {
    let base = normalize_channel(name);
    if private {
        format!("{}{}", PRIVATE_PREFIX, base)
    } else {
        base.to_string()
    }
}

/// Qualifies an event name the way Laravel Echo does.
///
/// A leading `.` (or `\`) means the name is used verbatim; otherwise the
/// namespace is prepended and dots become namespace separators.
pub fn qualify_event(event: &str, namespace: &str) -> String {
    if let Some(verbatim) = event.strip_prefix('.').or_else(|| event.strip_prefix('\\')) {
        return verbatim.to_string();
    }
    let namespace = namespace.trim_end_matches('\\');
    let event = event.replace('.', "\\");
    if namespace.is_empty() {
        event
    } else {
        format!("{}\\{}", namespace, event)
    }
}

/// Pusher close/error codes 4000-4099 mean "do not reconnect".
pub fn is_fatal_code(code: u16) -> bool {
    (4000..4100).contains(&code)
}
