// desk-client/src/http.rs
// REST 客户端 - 工单与系统通知接口

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use shared::models::{
    CommentRequest, RatingRequest, SystemNotification, Ticket, TicketInteraction, TicketQuery,
};
use std::sync::Arc;

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::session::SessionProvider;

/// 服务端返回的错误响应格式
#[derive(serde::Deserialize)]
struct ApiErrorResponse {
    #[serde(default)]
    #[allow(dead_code)]
    code: Option<serde_json::Value>,
    message: String,
}

/// File attached to a comment (sent as multipart)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub file_name: String,
    pub mime_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl Attachment {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            mime_type: None,
            bytes,
        }
    }

    pub fn with_mime_type(mut self, mime: impl Into<String>) -> Self {
        self.mime_type = Some(mime.into());
        self
    }
}

/// Desk REST API consumed by the stores
///
/// Implemented over the network by [`NetworkDeskApi`]; tests and embedding
/// hosts provide their own.
#[async_trait]
pub trait DeskApi: Send + Sync {
    async fn list_tickets(&self, query: &TicketQuery) -> ClientResult<Vec<Ticket>>;
    async fn get_ticket(&self, ticket_id: i64) -> ClientResult<Ticket>;
    async fn get_timeline(&self, ticket_id: i64) -> ClientResult<Vec<TicketInteraction>>;
    async fn add_comment(
        &self,
        ticket_id: i64,
        content: &str,
        attachment: Option<Attachment>,
    ) -> ClientResult<()>;
    async fn claim(&self, ticket_id: i64) -> ClientResult<Ticket>;
    async fn resolve(&self, ticket_id: i64) -> ClientResult<Ticket>;
    async fn rate(&self, ticket_id: i64, rating: u8, comment: Option<String>) -> ClientResult<()>;
    async fn pending_notifications(&self) -> ClientResult<Vec<SystemNotification>>;
    async fn mark_notification_read(&self, notification_id: i64) -> ClientResult<()>;
}

/// 网络 REST 客户端
#[derive(Clone)]
pub struct NetworkDeskApi {
    client: Client,
    base_url: String,
    session: Arc<dyn SessionProvider>,
}

impl NetworkDeskApi {
    pub fn new(config: &ClientConfig, session: Arc<dyn SessionProvider>) -> ClientResult<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            session,
        })
    }

    /// 获取基础 URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authorize(&self, req: RequestBuilder) -> ClientResult<RequestBuilder> {
        let identity = self.session.identity().ok_or(ClientError::NoSession)?;
        Ok(req.header(reqwest::header::AUTHORIZATION, identity.bearer()))
    }

    async fn check_status(&self, response: reqwest::Response) -> ClientResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::UNAUTHORIZED {
            self.session.on_unauthorized();
            return Err(ClientError::Unauthorized);
        }
        let text = response.text().await.unwrap_or_default();
        // 尝试解析为 API 错误响应
        let message = serde_json::from_str::<ApiErrorResponse>(&text)
            .map(|e| e.message)
            .unwrap_or_else(|_| {
                if text.is_empty() {
                    status.canonical_reason().unwrap_or("error").to_string()
                } else {
                    text
                }
            });
        match status {
            StatusCode::NOT_FOUND => Err(ClientError::NotFound(message)),
            _ => Err(ClientError::Api {
                status: status.as_u16(),
                message,
            }),
        }
    }

    async fn fetch<T: DeserializeOwned>(&self, req: RequestBuilder) -> ClientResult<T> {
        let response = self.authorize(req)?.send().await?;
        let response = self.check_status(response).await?;
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| {
            tracing::warn!("Failed to decode response body: {e}");
            ClientError::InvalidResponse(e.to_string())
        })
    }

    async fn execute(&self, req: RequestBuilder) -> ClientResult<()> {
        let response = self.authorize(req)?.send().await?;
        self.check_status(response).await?;
        Ok(())
    }
}

#[async_trait]
impl DeskApi for NetworkDeskApi {
    async fn list_tickets(&self, query: &TicketQuery) -> ClientResult<Vec<Ticket>> {
        let req = self
            .client
            .get(self.url("tickets"))
            .query(&query.to_query_pairs());
        self.fetch(req).await
    }

    async fn get_ticket(&self, ticket_id: i64) -> ClientResult<Ticket> {
        self.fetch(self.client.get(self.url(&format!("tickets/{ticket_id}"))))
            .await
    }

    async fn get_timeline(&self, ticket_id: i64) -> ClientResult<Vec<TicketInteraction>> {
        self.fetch(
            self.client
                .get(self.url(&format!("tickets/{ticket_id}/timeline"))),
        )
        .await
    }

    async fn add_comment(
        &self,
        ticket_id: i64,
        content: &str,
        attachment: Option<Attachment>,
    ) -> ClientResult<()> {
        let url = self.url(&format!("tickets/{ticket_id}/comments"));
        let req = match attachment {
            Some(file) => {
                let mut part =
                    reqwest::multipart::Part::bytes(file.bytes).file_name(file.file_name);
                if let Some(mime) = file.mime_type {
                    part = part.mime_str(&mime)?;
                }
                let form = reqwest::multipart::Form::new()
                    .text("content", content.to_string())
                    .part("file", part);
                self.client.post(url).multipart(form)
            }
            None => self.client.post(url).json(&CommentRequest {
                content: content.to_string(),
            }),
        };
        self.execute(req).await
    }

    async fn claim(&self, ticket_id: i64) -> ClientResult<Ticket> {
        self.fetch(
            self.client
                .post(self.url(&format!("tickets/{ticket_id}/claim"))),
        )
        .await
    }

    async fn resolve(&self, ticket_id: i64) -> ClientResult<Ticket> {
        self.fetch(
            self.client
                .post(self.url(&format!("tickets/{ticket_id}/resolve"))),
        )
        .await
    }

    async fn rate(&self, ticket_id: i64, rating: u8, comment: Option<String>) -> ClientResult<()> {
        let req = self
            .client
            .post(self.url(&format!("tickets/{ticket_id}/rating")))
            .json(&RatingRequest { rating, comment });
        self.execute(req).await
    }

    async fn pending_notifications(&self) -> ClientResult<Vec<SystemNotification>> {
        self.fetch(self.client.get(self.url("notifications/pending")))
            .await
    }

    async fn mark_notification_read(&self, notification_id: i64) -> ClientResult<()> {
        self.execute(
            self.client
                .post(self.url(&format!("notifications/{notification_id}/read"))),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{SessionHandle, SessionIdentity};

    #[test]
    fn test_url_building() {
        let config = ClientConfig::new("http://desk.local/api/");
        let api = NetworkDeskApi::new(&config, Arc::new(SessionHandle::new())).unwrap();
        assert_eq!(api.base_url(), "http://desk.local/api");
        assert_eq!(api.url("/tickets/1"), "http://desk.local/api/tickets/1");
        assert_eq!(api.url("notifications/pending"), "http://desk.local/api/notifications/pending");
    }

    #[tokio::test]
    async fn test_requests_without_session_fail_fast() {
        let config = ClientConfig::new("http://127.0.0.1:9");
        let api = NetworkDeskApi::new(&config, Arc::new(SessionHandle::new())).unwrap();
        let err = api.get_ticket(1).await.unwrap_err();
        assert!(matches!(err, ClientError::NoSession));

        let signed = SessionHandle::signed_in(SessionIdentity::new(1, "t"));
        let api = NetworkDeskApi::new(&config, Arc::new(signed)).unwrap();
        let err = api.get_ticket(1).await.unwrap_err();
        assert!(matches!(err, ClientError::Http(_)));
    }

    /// One-shot HTTP server answering every request with `response`
    async fn canned_server(response: &'static str) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_unauthorized_is_reported_to_session() {
        let url = canned_server(
            "HTTP/1.1 401 Unauthorized\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
        )
        .await;
        let session = SessionHandle::signed_in(SessionIdentity::new(1, "expired"));
        let api = NetworkDeskApi::new(&ClientConfig::new(url), Arc::new(session.clone())).unwrap();

        let err = api.pending_notifications().await.unwrap_err();
        assert!(matches!(err, ClientError::Unauthorized));
        assert_eq!(session.unauthorized_count(), 1);
    }

    #[tokio::test]
    async fn test_error_body_message_is_kept() {
        let url = canned_server(
            "HTTP/1.1 404 Not Found\r\ncontent-type: application/json\r\ncontent-length: 48\r\nconnection: close\r\n\r\n{\"code\":404,\"message\":\"Chamado não encontrado\"}",
        )
        .await;
        let session = SessionHandle::signed_in(SessionIdentity::new(1, "t"));
        let api = NetworkDeskApi::new(&ClientConfig::new(url), Arc::new(session.clone())).unwrap();

        match api.get_ticket(99).await.unwrap_err() {
            ClientError::NotFound(message) => assert_eq!(message, "Chamado não encontrado"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(session.unauthorized_count(), 0);
    }
}
