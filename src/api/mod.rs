//! Portal REST API: the [`PortalApi`] seam and its reqwest implementation.

mod client;
mod error;
mod types;

pub use client::{ApiClient, ApiClientConfig};
pub use error::{ApiError, Result, ServerError};
pub use types::{
    ApiResponse, Attachment, ChatQuery, ConversionUpdate, WithdrawalMethod, WithdrawalSubmission,
};

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::{
    ChatMessage, ChatPage, ConversionRequest, Notification, UserSnapshot, WithdrawalRequest,
};

/// Operations the client core needs from the backend.
#[async_trait]
pub trait PortalApi: Send + Sync {
    /// Full user snapshot: wallets, requests, notifications.
    async fn get_user(&self) -> Result<UserSnapshot>;

    async fn create_conversion(
        &self,
        from_wallet_id: &str,
        to_wallet_id: &str,
    ) -> Result<ApiResponse<ConversionRequest>>;

    async fn update_conversion(
        &self,
        id: &str,
        update: &ConversionUpdate,
    ) -> Result<ApiResponse<ConversionRequest>>;

    async fn cancel_conversion(&self, id: &str) -> Result<ApiResponse<Value>>;

    async fn submit_withdrawal(
        &self,
        submission: &WithdrawalSubmission,
    ) -> Result<ApiResponse<WithdrawalRequest>>;

    /// Submits the code for the stage the server currently reports.
    async fn update_withdrawal_stage(
        &self,
        id: &str,
        stage: &str,
        code: &str,
    ) -> Result<ApiResponse<WithdrawalRequest>>;

    async fn cancel_withdrawal(&self, id: &str) -> Result<ApiResponse<Value>>;

    async fn list_notifications(&self) -> Result<Vec<Notification>>;

    async fn mark_notification_read(&self, id: &str) -> Result<()>;

    async fn chat_messages(&self, query: &ChatQuery) -> Result<ChatPage>;

    async fn send_chat_message(&self, body: &str) -> Result<ChatMessage>;

    async fn upload_chat_attachment(&self, attachment: Attachment) -> Result<ChatMessage>;

    async fn chat_unread_count(&self) -> Result<u32>;
}

#[cfg(test)]
pub(crate) mod mock;
