use std::collections::HashMap;

use thiserror::Error;

/// Error reported by the portal backend.
///
/// `description` is kept only when it differs from `message`; `fields` holds
/// per-field validation messages (`{"errors": {"amount": ["..."]}}`).
#[derive(Debug, Clone, PartialEq, Error)]
#[error("portal api error {status}: {message}")]
pub struct ServerError {
    pub status: u16,
    pub message: String,
    pub description: Option<String>,
    pub fields: HashMap<String, Vec<String>>,
}

impl ServerError {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            description: None,
            fields: HashMap::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        let description = description.into();
        if !description.is_empty() && description != self.message {
            self.description = Some(description);
        }
        self
    }

    pub fn with_field(mut self, field: impl Into<String>, message: impl Into<String>) -> Self {
        self.fields
            .entry(field.into())
            .or_default()
            .push(message.into());
        self
    }

    /// First message reported for a field.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .and_then(|messages| messages.first())
            .map(String::as_str)
    }
}

/// REST client errors.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error(transparent)]
    Server(#[from] ServerError),
}

impl ApiError {
    /// Whether the failure never reached the backend's business logic.
    pub fn is_transport(&self) -> bool {
        matches!(self, ApiError::Request(_))
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ApiError>;
