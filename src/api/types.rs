//! Request bodies and response envelopes of the portal REST API.

use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::domain::{ChatMessage, ChatPage, lenient};

/// Response of a mutating call: the payload plus the server's user-facing copy.
///
/// Bodies come either wrapped (`{data, message, description}`) or bare.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse<T> {
    pub data: Option<T>,
    pub message: Option<String>,
    pub description: Option<String>,
}

impl<T> Default for ApiResponse<T> {
    fn default() -> Self {
        Self {
            data: None,
            message: None,
            description: None,
        }
    }
}

impl<T: DeserializeOwned> ApiResponse<T> {
    /// Splits a response body into payload and copy.
    ///
    /// A payload that does not decode as `T` is dropped: callers refetch the
    /// authoritative snapshot after every mutation anyway.
    pub fn from_value(value: Value) -> Self {
        let Value::Object(mut map) = value else {
            return Self {
                data: serde_json::from_value(value).ok(),
                ..Self::default()
            };
        };

        let message = map.get("message").and_then(text);
        let description = map
            .get("description")
            .or_else(|| map.get("error"))
            .and_then(text)
            .filter(|d| Some(d) != message.as_ref());

        let data = match map.remove("data") {
            Some(data) => serde_json::from_value(data).ok(),
            None => serde_json::from_value(Value::Object(map)).ok(),
        };

        Self {
            data,
            message,
            description,
        }
    }
}

fn text(value: &Value) -> Option<String> {
    value
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Unwraps `{data: T}` when present, otherwise decodes the whole body.
pub(crate) fn decode_data<T: DeserializeOwned>(value: Value) -> serde_json::Result<T> {
    match value {
        Value::Object(mut map) if map.contains_key("data") => {
            let data = map.remove("data").unwrap_or(Value::Null);
            serde_json::from_value(data)
        }
        other => serde_json::from_value(other),
    }
}

/// Decodes a chat listing: a paginator, a wrapped paginator, or a bare array.
pub(crate) fn decode_chat_page(value: Value) -> serde_json::Result<ChatPage> {
    match value {
        Value::Array(items) => Ok(ChatPage {
            data: serde_json::from_value::<Vec<ChatMessage>>(Value::Array(items))?,
            ..ChatPage::default()
        }),
        Value::Object(mut map) => match map.get("data") {
            Some(Value::Object(_)) => {
                let inner = map.remove("data").unwrap_or(Value::Null);
                decode_chat_page(inner)
            }
            _ => serde_json::from_value(Value::Object(map)),
        },
        other => serde_json::from_value(other),
    }
}

/// Reads the unread counter from `n`, `{count}`, `{unread_count}` or `{data: ..}`.
pub(crate) fn decode_unread_count(value: &Value) -> Option<u32> {
    match value {
        Value::Object(map) => ["count", "unread_count", "unread", "data"]
            .iter()
            .find_map(|key| map.get(*key).and_then(decode_unread_count)),
        other => lenient::parse_decimal(other)
            .and_then(|d| rust_decimal::prelude::ToPrimitive::to_u32(&d.trunc())),
    }
}

/// Body of `POST /conversion-requests/update/{id}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConversionUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmed_payment: Option<bool>,
}

impl ConversionUpdate {
    pub fn fee_amount(amount: Decimal) -> Self {
        Self {
            amount: Some(amount),
            confirmed_payment: None,
        }
    }

    pub fn confirm_payment() -> Self {
        Self {
            amount: None,
            confirmed_payment: Some(true),
        }
    }
}

/// Destination details of a withdrawal; the two methods are mutually exclusive.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "method", rename_all = "lowercase")]
pub enum WithdrawalMethod {
    Crypto {
        address: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        network: Option<String>,
    },
    Bank {
        bank_name: String,
        account_name: String,
        account_number: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        routing_number: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        swift_code: Option<String>,
    },
}

impl WithdrawalMethod {
    pub fn name(&self) -> &'static str {
        match self {
            WithdrawalMethod::Crypto { .. } => "crypto",
            WithdrawalMethod::Bank { .. } => "bank",
        }
    }
}

/// Body of `POST /withdrawal-requests`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WithdrawalSubmission {
    pub wallet_id: String,
    pub amount: Decimal,
    #[serde(flatten)]
    pub method: WithdrawalMethod,
}

/// Query of `GET /chat/messages`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatQuery {
    pub page: Option<u32>,
    /// Only messages created after this timestamp.
    pub after: Option<String>,
}

impl ChatQuery {
    pub fn page(page: u32) -> Self {
        Self {
            page: Some(page),
            after: None,
        }
    }

    pub fn after(timestamp: impl Into<String>) -> Self {
        Self {
            page: None,
            after: Some(timestamp.into()),
        }
    }

    pub(crate) fn pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(page) = self.page {
            pairs.push(("page", page.to_string()));
        }
        if let Some(after) = &self.after {
            pairs.push(("after", after.clone()));
        }
        pairs
    }
}

/// A file attached to a chat message.
#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
    /// Optional caption sent with the file.
    pub body: Option<String>,
}
