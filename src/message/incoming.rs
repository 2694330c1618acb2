//! Webhook delivery schema

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Cow;

/// Message types the platform can deliver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Address,
    Audio,
    Button,
    Contacts,
    Document,
    Image,
    Interactive,
    Flow,
    Location,
    Reaction,
    Sticker,
    Template,
    Text,
    Video,
    /// Anything the platform adds later; never matched by a type trigger
    /// unless registered explicitly.
    #[serde(other)]
    Unsupported,
}

impl MessageType {
    /// Whether messages of this type can carry text a pattern trigger reads
    pub fn is_text_bearing(self) -> bool {
        matches!(self, Self::Text | Self::Interactive | Self::Button)
    }
}

/// Top-level webhook POST body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub object: String,
    #[serde(default)]
    pub entry: Vec<WebhookEntry>,
}

impl WebhookPayload {
    /// Parse every `messages` change into an [`Incoming`] update.
    ///
    /// Changes for other fields (flow alerts, template status) are skipped.
    pub fn updates(&self) -> Result<Vec<Incoming>, serde_json::Error> {
        self.entry
            .iter()
            .flat_map(|entry| entry.changes.iter())
            .filter(|change| change.field == "messages")
            .map(|change| serde_json::from_value(change.value.clone()))
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEntry {
    /// WhatsApp Business Account ID
    pub id: String,
    #[serde(default)]
    pub changes: Vec<WebhookChange>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookChange {
    pub field: String,
    pub value: Value,
}

/// The `value` of a `messages` change
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incoming {
    #[serde(default = "default_product")]
    pub messaging_product: String,
    pub metadata: Metadata,
    #[serde(default)]
    pub contacts: Vec<Contact>,
    #[serde(default)]
    pub messages: Vec<IncomingMessage>,
    #[serde(default)]
    pub statuses: Vec<Status>,
    #[serde(default)]
    pub errors: Vec<ApiError>,
}

fn default_product() -> String {
    "whatsapp".to_string()
}

impl Incoming {
    /// Profile of the customer who sent `message`, when the platform included it
    pub fn contact_for(&self, message: &IncomingMessage) -> Option<&Contact> {
        self.contacts.iter().find(|c| c.wa_id == message.from)
    }
}

/// Business phone number the delivery was addressed to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub display_phone_number: String,
    /// Needed to reply: outbound calls are made on behalf of this number
    pub phone_number_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    /// Customer WhatsApp ID (may differ from the phone number)
    pub wa_id: String,
    #[serde(default)]
    pub profile: Profile,
}

impl Contact {
    pub fn customer_name(&self) -> Option<&str> {
        self.profile.name.as_deref()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub name: Option<String>,
}

/// A single inbound message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomingMessage {
    pub id: String,
    pub from: String,
    pub timestamp: String,
    #[serde(rename = "type")]
    pub kind: MessageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<MessageContext>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<TextBody>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interactive: Option<InteractiveReply>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub button: Option<QuickReplyButton>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<MediaMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<MediaMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video: Option<MediaMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<MediaMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sticker: Option<MediaMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reaction: Option<Reaction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contacts: Option<Vec<Value>>,
}

impl IncomingMessage {
    /// Build a plain text message, mostly useful for tests and local tooling
    pub fn text(id: impl Into<String>, from: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            from: from.into(),
            timestamp: chrono::Utc::now().timestamp().to_string(),
            kind: MessageType::Text,
            context: None,
            text: Some(TextBody { body: body.into() }),
            interactive: None,
            button: None,
            image: None,
            audio: None,
            video: None,
            document: None,
            sticker: None,
            location: None,
            reaction: None,
            contacts: None,
        }
    }

    /// Build a message of `kind` with no type-specific payload
    pub fn of_kind(id: impl Into<String>, from: impl Into<String>, kind: MessageType) -> Self {
        Self {
            kind,
            text: None,
            ..Self::text(id, from, String::new())
        }
    }

    /// Textual content a pattern trigger is evaluated against.
    ///
    /// Only text-bearing messages have one: plain text, interactive button
    /// and list replies, and template quick-reply buttons. Media, location,
    /// reactions and everything else return `None`.
    pub fn text_content(&self) -> Option<Cow<'_, str>> {
        if !self.kind.is_text_bearing() {
            return None;
        }
        match self.kind {
            MessageType::Text => self.text.as_ref().map(|t| Cow::Borrowed(t.body.as_str())),
            MessageType::Interactive => self.interactive.as_ref().and_then(InteractiveReply::value),
            MessageType::Button => self
                .button
                .as_ref()
                .map(|b| Cow::Borrowed(b.text.as_str())),
            _ => None,
        }
    }

    /// Media attachment for image/audio/video/document/sticker messages
    pub fn media(&self) -> Option<&MediaMetadata> {
        match self.kind {
            MessageType::Image => self.image.as_ref(),
            MessageType::Audio => self.audio.as_ref(),
            MessageType::Video => self.video.as_ref(),
            MessageType::Document => self.document.as_ref(),
            MessageType::Sticker => self.sticker.as_ref(),
            _ => None,
        }
    }
}

/// Present when the customer replied to (or forwarded) a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageContext {
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub forwarded: Option<bool>,
    #[serde(default)]
    pub frequently_forwarded: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextBody {
    pub body: String,
}

/// Reply to an interactive message we sent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InteractiveReply {
    ButtonReply { button_reply: ReplyItem },
    ListReply { list_reply: ReplyItem },
    /// Completion of a flow: the final screen's payload
    NfmReply { nfm_reply: FlowCompletion },
    #[serde(other)]
    Unknown,
}

impl InteractiveReply {
    fn value(&self) -> Option<Cow<'_, str>> {
        match self {
            Self::ButtonReply { button_reply: item } | Self::ListReply { list_reply: item } => {
                Some(item.value())
            }
            Self::NfmReply { .. } | Self::Unknown => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyItem {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ReplyItem {
    /// Title, followed by the description on its own line when there is one
    pub fn value(&self) -> Cow<'_, str> {
        match self.description.as_deref() {
            Some(description) if !description.is_empty() => {
                Cow::Owned(format!("{}\n{description}", self.title))
            }
            _ => Cow::Borrowed(self.title.as_str()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowCompletion {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    /// JSON document, encoded as a string by the platform
    pub response_json: String,
}

impl FlowCompletion {
    pub fn response(&self) -> serde_json::Result<Value> {
        serde_json::from_str(&self.response_json)
    }
}

/// Template quick-reply button press
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuickReplyButton {
    pub text: String,
    #[serde(default)]
    pub payload: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaMetadata {
    pub id: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub sha256: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
    /// Documents only
    #[serde(default)]
    pub filename: Option<String>,
    /// Audio only
    #[serde(default)]
    pub voice: Option<bool>,
    /// Stickers only
    #[serde(default)]
    pub animated: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    pub message_id: String,
    /// Absent when the customer removed their reaction
    #[serde(default)]
    pub emoji: Option<String>,
}

/// Delivery receipt for a message we sent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Status {
    pub id: String,
    pub status: DeliveryStatus,
    pub timestamp: String,
    pub recipient_id: String,
    #[serde(default)]
    pub biz_opaque_callback_data: Option<String>,
    #[serde(default)]
    pub conversation: Option<Value>,
    #[serde(default)]
    pub pricing: Option<Value>,
    #[serde(default)]
    pub errors: Vec<ApiError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Sent,
    Delivered,
    Read,
    Failed,
    #[serde(other)]
    Unknown,
}

/// Error object attached to deliveries and statuses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub code: i64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error_data: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn delivery(message: Value) -> Value {
        json!({
            "object": "whatsapp_business_account",
            "entry": [{
                "id": "102290129340398",
                "changes": [{
                    "field": "messages",
                    "value": {
                        "messaging_product": "whatsapp",
                        "metadata": {
                            "display_phone_number": "15550783881",
                            "phone_number_id": "106540352242922"
                        },
                        "contacts": [{ "wa_id": "5519900000000", "profile": { "name": "Customer" } }],
                        "messages": [message]
                    }
                }]
            }]
        })
    }

    #[test]
    fn test_parse_text_delivery() {
        let payload: WebhookPayload = serde_json::from_value(delivery(json!({
            "from": "5519900000000",
            "id": "wamid.HBgLMTY1MDM4Nzk0MzkVAgASGBQzQTRBNjU5OUFFRTAzODEwMTQ0RgA=",
            "timestamp": "1749416383",
            "type": "text",
            "text": { "body": "hi" }
        })))
        .unwrap();

        let updates = payload.updates().unwrap();
        assert_eq!(updates.len(), 1);
        let incoming = &updates[0];
        assert_eq!(incoming.metadata.phone_number_id, "106540352242922");

        let message = &incoming.messages[0];
        assert_eq!(message.kind, MessageType::Text);
        assert_eq!(message.text_content().as_deref(), Some("hi"));
        assert_eq!(
            incoming.contact_for(message).and_then(Contact::customer_name),
            Some("Customer")
        );
    }

    #[test]
    fn test_list_reply_text_includes_description() {
        let message: IncomingMessage = serde_json::from_value(json!({
            "from": "5519900000000",
            "id": "wamid.1",
            "timestamp": "1749416383",
            "type": "interactive",
            "interactive": {
                "type": "list_reply",
                "list_reply": { "id": "opt-1", "title": "Pizza", "description": "Large" }
            }
        }))
        .unwrap();

        assert_eq!(message.text_content().as_deref(), Some("Pizza\nLarge"));
    }

    #[test]
    fn test_button_reply_without_description_is_title() {
        let message: IncomingMessage = serde_json::from_value(json!({
            "from": "5519900000000",
            "id": "wamid.2",
            "timestamp": "1749416383",
            "type": "interactive",
            "interactive": {
                "type": "button_reply",
                "button_reply": { "id": "yes", "title": "Yes" }
            }
        }))
        .unwrap();

        assert_eq!(message.text_content().as_deref(), Some("Yes"));
    }

    #[test]
    fn test_media_has_no_text_content() {
        let message: IncomingMessage = serde_json::from_value(json!({
            "from": "5519900000000",
            "id": "wamid.3",
            "timestamp": "1749416383",
            "type": "image",
            "image": { "id": "1479537139650973", "mime_type": "image/jpeg", "caption": "123" }
        }))
        .unwrap();

        assert_eq!(message.kind, MessageType::Image);
        assert!(!message.kind.is_text_bearing());
        assert!(message.text_content().is_none());
        assert_eq!(message.media().map(|m| m.id.as_str()), Some("1479537139650973"));
    }

    #[test]
    fn test_unknown_type_is_unsupported() {
        let message: IncomingMessage = serde_json::from_value(json!({
            "from": "5519900000000",
            "id": "wamid.4",
            "timestamp": "1749416383",
            "type": "ephemeral"
        }))
        .unwrap();

        assert_eq!(message.kind, MessageType::Unsupported);
        assert!(!MessageType::Unsupported.is_text_bearing());
        assert!(message.text_content().is_none());
    }

    #[test]
    fn test_flow_completion_reply() {
        let message: IncomingMessage = serde_json::from_value(json!({
            "from": "5519900000000",
            "id": "wamid.5",
            "timestamp": "1749416383",
            "type": "interactive",
            "interactive": {
                "type": "nfm_reply",
                "nfm_reply": {
                    "name": "flow",
                    "body": "Sent",
                    "response_json": "{\"flow_token\":\"tok-1\",\"size\":\"L\"}"
                }
            }
        }))
        .unwrap();

        let Some(InteractiveReply::NfmReply { nfm_reply }) = &message.interactive else {
            panic!("expected nfm_reply");
        };
        assert_eq!(nfm_reply.response().unwrap()["size"], "L");
        assert!(message.text_content().is_none());
    }

    #[test]
    fn test_status_only_delivery_and_other_fields() {
        let payload: WebhookPayload = serde_json::from_value(json!({
            "object": "whatsapp_business_account",
            "entry": [{
                "id": "1",
                "changes": [
                    {
                        "field": "messages",
                        "value": {
                            "messaging_product": "whatsapp",
                            "metadata": { "display_phone_number": "1", "phone_number_id": "2" },
                            "statuses": [{
                                "id": "wamid.9",
                                "status": "delivered",
                                "timestamp": "1749416383",
                                "recipient_id": "5519900000000"
                            }]
                        }
                    },
                    { "field": "flows", "value": { "event": "FLOW_STATUS_CHANGE" } }
                ]
            }]
        }))
        .unwrap();

        let updates = payload.updates().unwrap();
        assert_eq!(updates.len(), 1);
        assert!(updates[0].messages.is_empty());
        assert_eq!(updates[0].statuses[0].status, DeliveryStatus::Delivered);
    }
}
