//! In-memory [`PortalApi`] for flow and bridge tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Notify;

use super::{
    ApiError, ApiResponse, Attachment, ChatQuery, ConversionUpdate, PortalApi, Result,
    ServerError, WithdrawalSubmission,
};
use crate::domain::{
    ChatMessage, ChatPage, ConversionRequest, Notification, UserSnapshot, WithdrawalRequest,
};

/// Records every call and answers from canned state.
#[derive(Default)]
pub(crate) struct MockApi {
    pub user: Mutex<UserSnapshot>,
    /// Snapshot served after the next successful mutation.
    pub after_mutation: Mutex<Option<UserSnapshot>>,
    pub calls: Mutex<Vec<String>>,
    /// Errors returned by the next mutating calls, in order.
    pub failures: Mutex<VecDeque<ServerError>>,
    /// Number of upcoming `get_user` calls that fail.
    pub user_failures: AtomicU32,
    /// Response copy for mutations.
    pub message: Mutex<Option<String>>,
    /// Request returned by the next withdrawal stage update.
    pub stage_result: Mutex<Option<WithdrawalRequest>>,
    pub unread: AtomicU32,
    pub messages: Mutex<Vec<ChatMessage>>,
    /// When set, mutations wait for a permit before answering.
    pub gate: Mutex<Option<Arc<Notify>>>,
}

impl MockApi {
    pub fn with_user(user: UserSnapshot) -> Self {
        let mock = Self::default();
        *mock.user.lock().unwrap() = user;
        mock
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls other than `get_user`.
    pub fn mutations(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c != "get_user")
            .collect()
    }

    pub fn fail_next(&self, err: ServerError) {
        self.failures.lock().unwrap().push_back(err);
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    async fn mutate<T>(&self, call: String, data: Option<T>) -> Result<ApiResponse<T>> {
        self.record(call);
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if let Some(err) = self.failures.lock().unwrap().pop_front() {
            return Err(ApiError::Server(err));
        }
        if let Some(next) = self.after_mutation.lock().unwrap().take() {
            *self.user.lock().unwrap() = next;
        }
        Ok(ApiResponse {
            data,
            message: self.message.lock().unwrap().clone(),
            description: None,
        })
    }
}

#[async_trait]
impl PortalApi for MockApi {
    async fn get_user(&self) -> Result<UserSnapshot> {
        self.record("get_user".to_string());
        let remaining = self.user_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.user_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(ApiError::UnexpectedResponse("user unavailable".to_string()));
        }
        Ok(self.user.lock().unwrap().clone())
    }

    async fn create_conversion(
        &self,
        from_wallet_id: &str,
        to_wallet_id: &str,
    ) -> Result<ApiResponse<ConversionRequest>> {
        self.mutate(format!("create_conversion {} {}", from_wallet_id, to_wallet_id), None)
            .await
    }

    async fn update_conversion(
        &self,
        id: &str,
        update: &ConversionUpdate,
    ) -> Result<ApiResponse<ConversionRequest>> {
        let body = serde_json::to_string(update).unwrap();
        self.mutate(format!("update_conversion {} {}", id, body), None).await
    }

    async fn cancel_conversion(&self, id: &str) -> Result<ApiResponse<Value>> {
        self.mutate(format!("cancel_conversion {}", id), None).await
    }

    async fn submit_withdrawal(
        &self,
        submission: &WithdrawalSubmission,
    ) -> Result<ApiResponse<WithdrawalRequest>> {
        let body = serde_json::to_string(submission).unwrap();
        self.mutate(format!("submit_withdrawal {}", body), None).await
    }

    async fn update_withdrawal_stage(
        &self,
        id: &str,
        stage: &str,
        code: &str,
    ) -> Result<ApiResponse<WithdrawalRequest>> {
        let result = self.stage_result.lock().unwrap().take();
        self.mutate(format!("update_withdrawal_stage {} {} {}", id, stage, code), result)
            .await
    }

    async fn cancel_withdrawal(&self, id: &str) -> Result<ApiResponse<Value>> {
        self.mutate(format!("cancel_withdrawal {}", id), None).await
    }

    async fn list_notifications(&self) -> Result<Vec<Notification>> {
        self.record("list_notifications".to_string());
        Ok(self.user.lock().unwrap().notifications.clone())
    }

    async fn mark_notification_read(&self, id: &str) -> Result<()> {
        self.mutate::<Value>(format!("mark_notification_read {}", id), None)
            .await
            .map(|_| ())
    }

    async fn chat_messages(&self, query: &ChatQuery) -> Result<ChatPage> {
        self.record(format!("chat_messages {:?} {:?}", query.page, query.after));
        let messages = self.messages.lock().unwrap().clone();
        let data = match &query.after {
            Some(after) => messages
                .into_iter()
                .filter(|m| m.created_at.as_deref().is_some_and(|c| c > after.as_str()))
                .collect(),
            None => messages,
        };
        Ok(ChatPage {
            data,
            current_page: Some(1),
            last_page: Some(1),
        })
    }

    async fn send_chat_message(&self, body: &str) -> Result<ChatMessage> {
        self.record(format!("send_chat_message {}", body));
        let id = self.messages.lock().unwrap().len() + 1;
        let message = ChatMessage {
            id: format!("m{}", id),
            sender_id: self.user.lock().unwrap().id.clone(),
            body: Some(body.to_string()),
            attachment_url: None,
            created_at: Some(format!("2024-01-01T00:00:{:02}Z", id)),
            read_at: None,
        };
        self.messages.lock().unwrap().push(message.clone());
        Ok(message)
    }

    async fn upload_chat_attachment(&self, attachment: Attachment) -> Result<ChatMessage> {
        self.record(format!("upload_chat_attachment {}", attachment.file_name));
        Ok(ChatMessage {
            id: "upload".to_string(),
            sender_id: self.user.lock().unwrap().id.clone(),
            body: attachment.body,
            attachment_url: Some(format!("/storage/{}", attachment.file_name)),
            created_at: None,
            read_at: None,
        })
    }

    async fn chat_unread_count(&self) -> Result<u32> {
        self.record("chat_unread_count".to_string());
        Ok(self.unread.load(Ordering::SeqCst))
    }
}
