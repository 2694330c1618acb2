//! WhatsApp Cloud API (Graph API) client

use crate::message::outgoing::ReadReceipt;
use crate::message::OutgoingMessage;
use crate::runtime::{MessageSender, OutboundError, SendReceipt};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Largest file the Cloud API accepts for any media type
const MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;

/// Media object metadata returned by `GET /{media_id}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaInfo {
    pub id: String,
    /// Short-lived download URL; needs the bearer token
    pub url: String,
    pub mime_type: String,
    pub sha256: String,
    pub file_size: u64,
    #[serde(default)]
    pub messaging_product: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UploadedMedia {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BusinessPublicKey {
    pub business_public_key: String,
    pub business_public_key_signature_status: String,
}

#[derive(Debug, Deserialize)]
struct BusinessPublicKeyList {
    #[serde(default)]
    data: Vec<BusinessPublicKey>,
}

#[derive(Debug, Deserialize)]
struct SuccessResponse {
    #[serde(default)]
    success: bool,
}

/// Client for the platform endpoints a bot talks to
#[derive(Clone)]
pub struct GraphApiClient {
    client: Client,
    token: String,
    base_url: String,
}

impl GraphApiClient {
    /// `endpoint` is e.g. `https://graph.facebook.com`, `api_version` e.g. `v19.0`
    pub fn new(
        token: impl Into<String>,
        endpoint: &str,
        api_version: &str,
    ) -> Result<Self, OutboundError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| OutboundError::Transport(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            token: token.into(),
            base_url: format!(
                "{}/{}",
                endpoint.trim_end_matches('/'),
                api_version.trim_matches('/')
            ),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, node: &str, edge: &str) -> String {
        if edge.is_empty() {
            format!("{}/{node}", self.base_url)
        } else {
            format!("{}/{node}/{edge}", self.base_url)
        }
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request.bearer_auth(&self.token)
    }

    /// Show blue ticks on an inbound message
    pub async fn mark_as_read(&self, bot_number_id: &str, message_id: &str) -> Result<(), OutboundError> {
        let request = self
            .authorized(self.client.post(self.url(bot_number_id, "messages")))
            .json(&ReadReceipt::new(message_id));
        let response: SuccessResponse = decode(send(request).await?).await?;
        if !response.success {
            tracing::warn!(message_id, "Read receipt not acknowledged");
        }
        Ok(())
    }

    /// Upload a file and return its media id
    pub async fn upload_media(
        &self,
        bot_number_id: &str,
        data: Vec<u8>,
        mime_type: &str,
        file_name: &str,
    ) -> Result<UploadedMedia, OutboundError> {
        if data.len() > MAX_UPLOAD_BYTES {
            tracing::warn!(bytes = data.len(), "Media exceeds the 100MB Cloud API limit");
            return Err(OutboundError::TooLarge {
                size: data.len(),
                limit: MAX_UPLOAD_BYTES,
            });
        }
        let part = Part::bytes(data)
            .file_name(file_name.to_string())
            .mime_str(mime_type)
            .map_err(|e| OutboundError::Transport(format!("Invalid MIME type {mime_type}: {e}")))?;
        let form = Form::new()
            .text("messaging_product", "whatsapp")
            .text("type", mime_type.to_string())
            .part("file", part);

        let request = self
            .authorized(self.client.post(self.url(bot_number_id, "media")))
            .multipart(form);
        let uploaded: UploadedMedia = decode(send(request).await?).await?;
        tracing::info!(media_id = %uploaded.id, mime_type, "Uploaded media");
        Ok(uploaded)
    }

    pub async fn retrieve_media_info(&self, media_id: &str) -> Result<MediaInfo, OutboundError> {
        let request = self.authorized(self.client.get(self.url(media_id, "")));
        decode(send(request).await?).await
    }

    /// Fetch the bytes behind a media URL (from [`MediaInfo::url`])
    pub async fn download_media(&self, media_url: &str) -> Result<Vec<u8>, OutboundError> {
        let request = self.authorized(self.client.get(media_url));
        let bytes = send(request)
            .await?
            .bytes()
            .await
            .map_err(|e| OutboundError::Transport(format!("Failed to read media body: {e}")))?;
        Ok(bytes.to_vec())
    }

    /// Returns whether the platform confirmed the deletion
    pub async fn delete_media(&self, media_id: &str) -> Result<bool, OutboundError> {
        let request = self.authorized(self.client.delete(self.url(media_id, "")));
        let response: SuccessResponse = decode(send(request).await?).await?;
        Ok(response.success)
    }

    /// Register the flow public key (SPKI PEM) for a business number
    pub async fn set_business_public_key(
        &self,
        bot_number_id: &str,
        public_key_pem: &str,
    ) -> Result<bool, OutboundError> {
        let request = self
            .authorized(
                self.client
                    .post(self.url(bot_number_id, "whatsapp_business_encryption")),
            )
            .form(&[("business_public_key", public_key_pem)]);
        let response: SuccessResponse = decode(send(request).await?).await?;
        tracing::info!(bot_number_id, success = response.success, "Registered flow public key");
        Ok(response.success)
    }

    pub async fn get_business_public_key(
        &self,
        bot_number_id: &str,
    ) -> Result<Option<BusinessPublicKey>, OutboundError> {
        let request = self.authorized(
            self.client
                .get(self.url(bot_number_id, "whatsapp_business_encryption")),
        );
        let list: BusinessPublicKeyList = decode(send(request).await?).await?;
        Ok(list.data.into_iter().next())
    }
}

#[async_trait]
impl MessageSender for GraphApiClient {
    async fn send_message(
        &self,
        bot_number_id: &str,
        message: &OutgoingMessage,
    ) -> Result<SendReceipt, OutboundError> {
        let request = self
            .authorized(self.client.post(self.url(bot_number_id, "messages")))
            .json(message);
        let receipt: SendReceipt = decode(send(request).await?).await?;
        tracing::debug!(to = %message.to, message_id = ?receipt.message_id(), "Message sent");
        Ok(receipt)
    }
}

/// Send and turn transport failures and non-2xx statuses into errors
async fn send(request: RequestBuilder) -> Result<Response, OutboundError> {
    let response = request.send().await.map_err(|e| {
        if e.is_timeout() {
            OutboundError::Transport(format!("Request timeout: {e}"))
        } else if e.is_connect() {
            OutboundError::Transport(format!("Connection failed: {e}"))
        } else {
            OutboundError::Transport(format!("Request failed: {e}"))
        }
    })?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    tracing::error!(status = status.as_u16(), body = %body, "Graph API request failed");
    Err(OutboundError::Api {
        status: status.as_u16(),
        body,
    })
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, OutboundError> {
    let body = response
        .text()
        .await
        .map_err(|e| OutboundError::Transport(format!("Failed to read response: {e}")))?;
    serde_json::from_str(&body)
        .map_err(|e| OutboundError::Decode(format!("{e} - body: {body}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Path, State};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Recorded {
        requests: Arc<Mutex<Vec<(String, Option<String>, String)>>>,
    }

    async fn messages(
        State(recorded): State<Recorded>,
        Path(bot): Path<String>,
        headers: HeaderMap,
        body: String,
    ) -> (StatusCode, Json<Value>) {
        let auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        recorded.requests.lock().unwrap().push((bot.clone(), auth, body.clone()));

        if bot == "broken" {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": {"message": "Invalid parameter", "code": 100}})),
            );
        }
        let parsed: Value = serde_json::from_str(&body).unwrap();
        if parsed["status"] == "read" {
            return (StatusCode::OK, Json(json!({"success": true})));
        }
        (
            StatusCode::OK,
            Json(json!({
                "messaging_product": "whatsapp",
                "contacts": [{"input": parsed["to"], "wa_id": parsed["to"]}],
                "messages": [{"id": "wamid.sent1"}]
            })),
        )
    }

    async fn media_info(Path(id): Path<String>) -> Json<Value> {
        Json(json!({
            "messaging_product": "whatsapp",
            "url": "http://cdn.invalid/file",
            "mime_type": "image/jpeg",
            "sha256": "abc",
            "file_size": 1024,
            "id": id
        }))
    }

    async fn encryption_key(body: String) -> Json<Value> {
        assert!(body.starts_with("business_public_key="));
        Json(json!({"success": true}))
    }

    async fn spawn_mock() -> (GraphApiClient, Recorded) {
        let recorded = Recorded::default();
        let app = Router::new()
            .route("/v19.0/:id/messages", post(messages))
            .route("/v19.0/:id/whatsapp_business_encryption", post(encryption_key))
            .route("/v19.0/:id", get(media_info))
            .with_state(recorded.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let client = GraphApiClient::new("secret-token", &format!("http://{addr}/"), "v19.0").unwrap();
        (client, recorded)
    }

    #[tokio::test]
    async fn test_send_message_posts_json_with_bearer() {
        let (client, recorded) = spawn_mock().await;

        let receipt = client
            .send_message("1001", &OutgoingMessage::text("5511988887777", "hi"))
            .await
            .unwrap();

        assert_eq!(receipt.message_id(), Some("wamid.sent1"));
        let requests = recorded.requests.lock().unwrap();
        let (bot, auth, body) = &requests[0];
        assert_eq!(bot, "1001");
        assert_eq!(auth.as_deref(), Some("Bearer secret-token"));
        let body: Value = serde_json::from_str(body).unwrap();
        assert_eq!(body["text"]["body"], "hi");
    }

    #[tokio::test]
    async fn test_api_error_surfaces_status_and_body() {
        let (client, _) = spawn_mock().await;

        let err = client
            .send_message("broken", &OutgoingMessage::text("5511988887777", "hi"))
            .await
            .unwrap_err();

        match err {
            OutboundError::Api { status, body } => {
                assert_eq!(status, 400);
                assert!(body.contains("Invalid parameter"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_mark_as_read_and_media_info() {
        let (client, _) = spawn_mock().await;

        client.mark_as_read("1001", "wamid.in1").await.unwrap();

        let info = client.retrieve_media_info("7788").await.unwrap();
        assert_eq!(info.id, "7788");
        assert_eq!(info.file_size, 1024);
    }

    #[tokio::test]
    async fn test_set_business_public_key_sends_form() {
        let (client, _) = spawn_mock().await;
        assert!(client
            .set_business_public_key("1001", "-----BEGIN PUBLIC KEY-----")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_oversized_upload_is_rejected_before_sending() {
        let (client, recorded) = spawn_mock().await;

        let err = client
            .upload_media("1001", vec![0; MAX_UPLOAD_BYTES + 1], "video/mp4", "big.mp4")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            OutboundError::TooLarge { size, limit } if size == limit + 1
        ));
        assert!(recorded.requests.lock().unwrap().is_empty());
    }

    #[test]
    fn test_base_url_normalization() {
        let client = GraphApiClient::new("t", "https://graph.facebook.com/", "/v19.0/").unwrap();
        assert_eq!(client.base_url(), "https://graph.facebook.com/v19.0");
        assert_eq!(client.url("123", ""), "https://graph.facebook.com/v19.0/123");
    }
}
