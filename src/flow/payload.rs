//! Decrypted flow payloads

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;

/// What the platform asks of the endpoint.
///
/// Unknown actions are kept verbatim so the application can decide how to
/// answer them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FlowAction {
    /// Health check; always answered with `{"data":{"status":"active"}}`
    Ping,
    /// Flow opened with a data-exchange first screen
    Init,
    /// Screen submitted
    DataExchange,
    /// Back button pressed with `refresh_on_back` enabled
    Back,
    Other(String),
}

impl FlowAction {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Ping => "ping",
            Self::Init => "INIT",
            Self::DataExchange => "data_exchange",
            Self::Back => "BACK",
            Self::Other(action) => action,
        }
    }
}

impl From<String> for FlowAction {
    fn from(action: String) -> Self {
        match action.as_str() {
            "ping" => Self::Ping,
            "INIT" => Self::Init,
            "data_exchange" => Self::DataExchange,
            "BACK" => Self::Back,
            _ => Self::Other(action),
        }
    }
}

impl From<FlowAction> for String {
    fn from(action: FlowAction) -> Self {
        match action {
            FlowAction::Other(action) => action,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for FlowAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decrypted request body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowRequest {
    pub version: String,
    pub action: FlowAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screen: Option<String>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow_token: Option<String>,
}

impl FlowRequest {
    /// Client-side error report, sent as `data.error` on a data exchange.
    ///
    /// Returns the error code and the optional human-readable message.
    pub fn error_notification(&self) -> Option<(&str, Option<&str>)> {
        let error = self.field("error")?.as_str()?;
        let message = self.field("error_message").and_then(Value::as_str);
        Some((error, message))
    }

    /// Field of `data`, if present
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.data.get(name)
    }
}

/// Plaintext response, encrypted before it leaves the endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screen: Option<String>,
    pub data: Value,
}

impl FlowResponse {
    /// Next screen and the data it renders with
    pub fn screen(screen: impl Into<String>, data: Value) -> Self {
        Self {
            screen: Some(screen.into()),
            data,
        }
    }

    pub fn health_check() -> Self {
        Self {
            screen: None,
            data: json!({"status": "active"}),
        }
    }

    /// Reply to an error notification
    pub fn acknowledged() -> Self {
        Self {
            screen: None,
            data: json!({"acknowledged": true}),
        }
    }

    /// Keep the user on `screen` and show `message` as a snackbar
    pub fn error_message(screen: impl Into<String>, message: impl Into<String>) -> Self {
        Self::screen(screen, json!({"error_message": message.into()}))
    }

    /// Close the flow; `params` come back to the bot in the completion message
    pub fn complete(flow_token: impl Into<String>, params: Map<String, Value>) -> Self {
        let mut params = params;
        params.insert("flow_token".to_string(), Value::String(flow_token.into()));
        Self::screen(
            "SUCCESS",
            json!({"extension_message_response": {"params": params}}),
        )
    }
}

/// Media attached to a flow response (PhotoPicker/DocumentPicker)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowMediaReference {
    pub file_name: String,
    pub media_id: String,
    pub cdn_url: String,
    pub encryption_metadata: MediaEncryptionMetadata,
}

/// Keys and hashes protecting one CDN object, all base64
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaEncryptionMetadata {
    pub encryption_key: String,
    pub hmac_key: String,
    pub iv: String,
    pub plaintext_hash: String,
    pub encrypted_hash: String,
}

impl fmt::Debug for MediaEncryptionMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaEncryptionMetadata")
            .field("plaintext_hash", &self.plaintext_hash)
            .field("encrypted_hash", &self.encrypted_hash)
            .finish_non_exhaustive()
    }
}
