//! HTTP client for the portal REST API.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client as HttpClient, Method, RequestBuilder, StatusCode};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, warn};

use super::types::{decode_chat_page, decode_data, decode_unread_count};
use super::{
    ApiError, ApiResponse, Attachment, ChatQuery, ConversionUpdate, PortalApi, Result,
    ServerError, WithdrawalSubmission,
};
use crate::config::{ApiConfig, BrokerConfig};
use crate::domain::{ChatMessage, ChatPage, ConversionRequest, Notification, UserSnapshot, WithdrawalRequest};
use crate::realtime::{BrokerError, ChannelAuth, ChannelAuthorizer};

/// HTTP request timeout when none is configured.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Channel authorization endpoint when none is configured.
const DEFAULT_AUTH_ENDPOINT: &str = "/broadcasting/auth";

/// Configuration for creating a new [`ApiClient`].
#[derive(Debug, Clone)]
pub struct ApiClientConfig {
    pub base_url: String,
    pub token: String,
    pub timeout: Duration,
    pub auth_endpoint: String,
}

impl ApiClientConfig {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: token.into(),
            timeout: DEFAULT_TIMEOUT,
            auth_endpoint: DEFAULT_AUTH_ENDPOINT.to_string(),
        }
    }

    pub fn from_config(api: &ApiConfig, broker: &BrokerConfig) -> Self {
        let mut config = Self::new(api.base_url.trim(), api.token.clone());
        if !api.timeout.is_zero() {
            config.timeout = api.timeout;
        }
        if let Some(endpoint) = broker.auth_endpoint.as_deref().filter(|e| !e.is_empty()) {
            config.auth_endpoint = endpoint.to_string();
        }
        config
    }
}

/// REST client for the portal backend.
///
/// Authenticates with a bearer token, unwraps `{data, message}` envelopes and
/// turns error bodies into [`ServerError`]. Also serves as the broker's
/// channel authorizer via `POST /broadcasting/auth`.
pub struct ApiClient {
    config: ApiClientConfig,
    http_client: HttpClient,
    request_count: AtomicU64,
}

impl ApiClient {
    pub fn new(config: ApiClientConfig) -> Result<Self> {
        let http_client = HttpClient::builder().timeout(config.timeout).build()?;

        Ok(Self {
            config,
            http_client,
            request_count: AtomicU64::new(0),
        })
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let mut request = self
            .http_client
            .request(method, self.url(path))
            .header(reqwest::header::ACCEPT, "application/json");
        if !self.config.token.is_empty() {
            request = request.bearer_auth(&self.config.token);
        }
        request
    }

    /// Sends a request and returns the decoded JSON body (`Null` when empty).
    async fn send(&self, request: RequestBuilder, path: &str) -> Result<Value> {
        debug!(endpoint = %path, "sending request");

        let response = request.send().await?;
        self.request_count.fetch_add(1, Ordering::Relaxed);

        let status = response.status();
        let body = response.bytes().await?;

        if status.is_client_error() || status.is_server_error() {
            return Err(parse_error_response(status, &body).into());
        }
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_slice(&body)?)
    }

    async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<Value> {
        let request = self.request(Method::GET, path).query(query);
        self.send(request, path).await
    }

    async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Value> {
        let request = self.request(Method::POST, path).json(body);
        self.send(request, path).await
    }

    /// Number of requests sent so far.
    pub fn request_count(&self) -> u64 {
        self.request_count.load(Ordering::Relaxed)
    }
}

/// Builds a [`ServerError`] from an error response.
///
/// Understands Laravel-style bodies: `{message, description|error, errors: {field: [..]}}`.
pub(crate) fn parse_error_response(status: StatusCode, body: &[u8]) -> ServerError {
    let fallback = || {
        let text = String::from_utf8_lossy(body).trim().to_string();
        if text.is_empty() {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        } else {
            text
        }
    };

    let Ok(Value::Object(map)) = serde_json::from_slice::<Value>(body) else {
        let err = ServerError::new(status.as_u16(), fallback());
        warn!(status = err.status, message = %err.message, "api error");
        return err;
    };

    let text = |key: &str| {
        map.get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    let mut err = ServerError::new(status.as_u16(), text("message").unwrap_or_else(fallback));
    if let Some(description) = text("description").or_else(|| text("error")) {
        err = err.with_description(description);
    }

    if let Some(Value::Object(errors)) = map.get("errors") {
        let mut fields: HashMap<String, Vec<String>> = HashMap::new();
        for (field, messages) in errors {
            let messages: Vec<String> = match messages {
                Value::Array(items) => items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect(),
                Value::String(s) => vec![s.clone()],
                _ => Vec::new(),
            };
            if !messages.is_empty() {
                fields.insert(field.clone(), messages);
            }
        }
        err.fields = fields;
    }

    warn!(status = err.status, message = %err.message, fields = err.fields.len(), "api error");
    err
}

#[async_trait]
impl PortalApi for ApiClient {
    async fn get_user(&self) -> Result<UserSnapshot> {
        let body = self.get("/user", &[]).await?;
        Ok(decode_data(body)?)
    }

    async fn create_conversion(
        &self,
        from_wallet_id: &str,
        to_wallet_id: &str,
    ) -> Result<ApiResponse<ConversionRequest>> {
        let body = json!({
            "from_wallet_id": from_wallet_id,
            "to_wallet_id": to_wallet_id,
        });
        let resp = self.post("/conversion-requests", &body).await?;
        Ok(ApiResponse::from_value(resp))
    }

    async fn update_conversion(
        &self,
        id: &str,
        update: &ConversionUpdate,
    ) -> Result<ApiResponse<ConversionRequest>> {
        let path = format!("/conversion-requests/update/{}", id);
        let resp = self.post(&path, update).await?;
        Ok(ApiResponse::from_value(resp))
    }

    async fn cancel_conversion(&self, id: &str) -> Result<ApiResponse<Value>> {
        let path = format!("/conversion-requests/cancel/{}", id);
        let resp = self.post(&path, &json!({})).await?;
        Ok(ApiResponse::from_value(resp))
    }

    async fn submit_withdrawal(
        &self,
        submission: &WithdrawalSubmission,
    ) -> Result<ApiResponse<WithdrawalRequest>> {
        let resp = self.post("/withdrawal-requests", submission).await?;
        Ok(ApiResponse::from_value(resp))
    }

    async fn update_withdrawal_stage(
        &self,
        id: &str,
        stage: &str,
        code: &str,
    ) -> Result<ApiResponse<WithdrawalRequest>> {
        let path = format!("/withdrawal-requests/update-stage/{}", id);
        let resp = self.post(&path, &json!({ "stage": stage, "code": code })).await?;
        Ok(ApiResponse::from_value(resp))
    }

    async fn cancel_withdrawal(&self, id: &str) -> Result<ApiResponse<Value>> {
        let path = format!("/withdrawal-requests/cancel/{}", id);
        let resp = self.post(&path, &json!({})).await?;
        Ok(ApiResponse::from_value(resp))
    }

    async fn list_notifications(&self) -> Result<Vec<Notification>> {
        let body = self.get("/notifications", &[]).await?;
        Ok(decode_data(body)?)
    }

    async fn mark_notification_read(&self, id: &str) -> Result<()> {
        let path = format!("/notifications/{}/read", id);
        self.post(&path, &json!({})).await?;
        Ok(())
    }

    async fn chat_messages(&self, query: &ChatQuery) -> Result<ChatPage> {
        let body = self.get("/chat/messages", &query.pairs()).await?;
        Ok(decode_chat_page(body)?)
    }

    async fn send_chat_message(&self, body: &str) -> Result<ChatMessage> {
        let resp = self.post("/chat/messages", &json!({ "body": body })).await?;
        Ok(decode_data(resp)?)
    }

    async fn upload_chat_attachment(&self, attachment: Attachment) -> Result<ChatMessage> {
        let part = Part::bytes(attachment.bytes)
            .file_name(attachment.file_name)
            .mime_str(&attachment.mime_type)?;
        let mut form = Form::new().part("file", part);
        if let Some(body) = attachment.body {
            form = form.text("body", body);
        }

        let path = "/chat/upload";
        let request = self.request(Method::POST, path).multipart(form);
        let resp = self.send(request, path).await?;
        Ok(decode_data(resp)?)
    }

    async fn chat_unread_count(&self) -> Result<u32> {
        let body = self.get("/chat/unread-count", &[]).await?;
        decode_unread_count(&body)
            .ok_or_else(|| ApiError::UnexpectedResponse(format!("unread count: {}", body)))
    }
}

#[async_trait]
impl ChannelAuthorizer for ApiClient {
    async fn authorize(&self, socket_id: &str, channel: &str) -> std::result::Result<ChannelAuth, BrokerError> {
        let body = json!({ "socket_id": socket_id, "channel_name": channel });
        let failed = |reason: String| BrokerError::Authorization {
            channel: channel.to_string(),
            reason,
        };

        let resp = self
            .post(&self.config.auth_endpoint, &body)
            .await
            .map_err(|e| failed(e.to_string()))?;
        serde_json::from_value(resp).map_err(|e| failed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    /// Serves one canned HTTP response and hands back the raw request.
    async fn serve_once(status: &'static str, body: &'static str) -> (String, oneshot::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut raw = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                raw.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&raw).to_string();
                if let Some(head_end) = text.find("\r\n\r\n") {
                    let length = text[..head_end]
                        .lines()
                        .find_map(|l| {
                            let (name, value) = l.split_once(':')?;
                            name.eq_ignore_ascii_case("content-length")
                                .then(|| value.trim().parse::<usize>().ok())
                                .flatten()
                        })
                        .unwrap_or(0);
                    if raw.len() >= head_end + 4 + length {
                        break;
                    }
                }
                if n == 0 {
                    break;
                }
            }

            let response = format!(
                "HTTP/1.1 {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = tx.send(String::from_utf8_lossy(&raw).to_string());
        });

        (format!("http://{}/api", addr), rx)
    }

    fn client(base_url: String) -> ApiClient {
        ApiClient::new(ApiClientConfig::new(base_url, "secret-token")).unwrap()
    }

    #[test]
    fn test_parse_validation_error() {
        let body = br#"{"message":"The given data was invalid.","errors":{"code":["The code must be 6 characters."],"amount":"Too much"}}"#;
        let err = parse_error_response(StatusCode::UNPROCESSABLE_ENTITY, body);
        assert_eq!(err.status, 422);
        assert_eq!(err.message, "The given data was invalid.");
        assert_eq!(err.field("code"), Some("The code must be 6 characters."));
        assert_eq!(err.field("amount"), Some("Too much"));
        assert_eq!(err.description, None);
    }

    #[test]
    fn test_parse_error_with_description() {
        let body = br#"{"message":"Payment failed","description":"Card declined by issuer"}"#;
        let err = parse_error_response(StatusCode::BAD_REQUEST, body);
        assert_eq!(err.description.as_deref(), Some("Card declined by issuer"));

        let body = br#"{"message":"Same","error":"Same"}"#;
        let err = parse_error_response(StatusCode::BAD_REQUEST, body);
        assert_eq!(err.description, None);
    }

    #[test]
    fn test_parse_non_json_error() {
        let err = parse_error_response(StatusCode::BAD_GATEWAY, b"upstream down");
        assert_eq!(err.status, 502);
        assert_eq!(err.message, "upstream down");

        let err = parse_error_response(StatusCode::SERVICE_UNAVAILABLE, b"");
        assert_eq!(err.message, "Service Unavailable");
    }

    #[test]
    fn test_url_joining() {
        let c = client("https://portal.example.com/api/".to_string());
        assert_eq!(c.url("/user"), "https://portal.example.com/api/user");
        assert_eq!(c.url("chat/unread-count"), "https://portal.example.com/api/chat/unread-count");
    }

    #[tokio::test]
    async fn test_get_user_sends_bearer_token() {
        let (base, request) = serve_once(
            "200 OK",
            r#"{"data":{"id":5,"name":"Ada","wallets":[{"id":1,"name":"Bitcoin","balance":"0.5"}]}}"#,
        )
        .await;

        let user = client(base).get_user().await.unwrap();
        assert_eq!(user.id.as_deref(), Some("5"));
        assert_eq!(user.wallets.len(), 1);

        let raw = request.await.unwrap();
        assert!(raw.starts_with("GET /api/user "));
        assert!(raw.to_lowercase().contains("authorization: bearer secret-token"));
    }

    #[tokio::test]
    async fn test_stage_update_field_errors() {
        let (base, request) = serve_once(
            "422 Unprocessable Entity",
            r#"{"message":"Invalid code","errors":{"code":["Wrong code"]}}"#,
        )
        .await;

        let err = client(base)
            .update_withdrawal_stage("9", "entity_pin", "1234")
            .await
            .unwrap_err();
        match err {
            ApiError::Server(server) => {
                assert_eq!(server.status, 422);
                assert_eq!(server.field("code"), Some("Wrong code"));
            }
            other => panic!("unexpected error: {:?}", other),
        }

        let raw = request.await.unwrap();
        assert!(raw.starts_with("POST /api/withdrawal-requests/update-stage/9 "));
        assert!(raw.contains(r#""stage":"entity_pin""#));
        assert!(raw.contains(r#""code":"1234""#));
    }

    #[tokio::test]
    async fn test_chat_messages_query() {
        let (base, request) = serve_once("200 OK", r#"{"data":[{"id":1,"body":"hi"}],"current_page":1,"last_page":1}"#).await;

        let page = client(base)
            .chat_messages(&ChatQuery::after("2024-05-01T10:00:00Z"))
            .await
            .unwrap();
        assert_eq!(page.data.len(), 1);

        let raw = request.await.unwrap();
        assert!(raw.starts_with("GET /api/chat/messages?after=2024-05-01T10%3A00%3A00Z "));
    }

    #[tokio::test]
    async fn test_channel_authorization() {
        let (base, request) = serve_once("200 OK", r#"{"auth":"key:signature"}"#).await;

        let auth = client(base).authorize("1.2", "private-user.5").await.unwrap();
        assert_eq!(auth.auth, "key:signature");

        let raw = request.await.unwrap();
        assert!(raw.starts_with("POST /api/broadcasting/auth "));
        assert!(raw.contains(r#""channel_name":"private-user.5""#));
    }

    #[tokio::test]
    async fn test_channel_authorization_failure() {
        let (base, _request) = serve_once("403 Forbidden", r#"{"message":"Unauthorized"}"#).await;

        let err = client(base).authorize("1.2", "private-user.6").await.unwrap_err();
        assert!(matches!(err, BrokerError::Authorization { .. }));
    }
}
