//! Outbound message payloads
//!
//! Every builder produces the JSON body the `/{phone_number_id}/messages`
//! edge expects; the platform-wide envelope fields (`messaging_product`,
//! `recipient_type`) are filled in here so handlers never repeat them.

use serde::Serialize;

/// A message ready to be posted on behalf of a business number
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutgoingMessage {
    messaging_product: &'static str,
    recipient_type: &'static str,
    pub to: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<ReplyContext>,
    #[serde(flatten)]
    pub body: OutgoingBody,
}

/// Quote a previous message when replying
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplyContext {
    pub message_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutgoingBody {
    Text { text: TextPayload },
    Reaction { reaction: ReactionPayload },
    Image { image: MediaPayload },
    Audio { audio: MediaPayload },
    Video { video: MediaPayload },
    Document { document: MediaPayload },
    Sticker { sticker: MediaPayload },
    Location { location: LocationPayload },
    Interactive { interactive: InteractivePayload },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextPayload {
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview_url: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReactionPayload {
    pub message_id: String,
    pub emoji: String,
}

/// Where the platform fetches a media attachment from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaSource {
    /// Media uploaded through the media endpoint (recommended)
    Id(String),
    /// Publicly reachable URL
    Link(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

impl MediaPayload {
    fn new(source: MediaSource) -> Self {
        let (id, link) = match source {
            MediaSource::Id(id) => (Some(id), None),
            MediaSource::Link(link) => (None, Some(link)),
        };
        Self {
            id,
            link,
            caption: None,
            filename: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationPayload {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl OutgoingMessage {
    fn new(to: impl Into<String>, body: OutgoingBody) -> Self {
        Self {
            messaging_product: "whatsapp",
            recipient_type: "individual",
            to: to.into(),
            context: None,
            body,
        }
    }

    /// Plain text, at most 4096 characters
    pub fn text(to: impl Into<String>, body: impl Into<String>) -> Self {
        Self::new(
            to,
            OutgoingBody::Text {
                text: TextPayload {
                    body: body.into(),
                    preview_url: None,
                },
            },
        )
    }

    pub fn reaction(
        to: impl Into<String>,
        message_id: impl Into<String>,
        emoji: impl Into<String>,
    ) -> Self {
        Self::new(
            to,
            OutgoingBody::Reaction {
                reaction: ReactionPayload {
                    message_id: message_id.into(),
                    emoji: emoji.into(),
                },
            },
        )
    }

    pub fn image(to: impl Into<String>, source: MediaSource, caption: Option<String>) -> Self {
        let mut image = MediaPayload::new(source);
        image.caption = caption;
        Self::new(to, OutgoingBody::Image { image })
    }

    pub fn audio(to: impl Into<String>, source: MediaSource) -> Self {
        Self::new(
            to,
            OutgoingBody::Audio {
                audio: MediaPayload::new(source),
            },
        )
    }

    pub fn video(to: impl Into<String>, source: MediaSource, caption: Option<String>) -> Self {
        let mut video = MediaPayload::new(source);
        video.caption = caption;
        Self::new(to, OutgoingBody::Video { video })
    }

    pub fn document(
        to: impl Into<String>,
        source: MediaSource,
        caption: Option<String>,
        filename: Option<String>,
    ) -> Self {
        let mut document = MediaPayload::new(source);
        document.caption = caption;
        document.filename = filename;
        Self::new(to, OutgoingBody::Document { document })
    }

    pub fn sticker(to: impl Into<String>, source: MediaSource) -> Self {
        Self::new(
            to,
            OutgoingBody::Sticker {
                sticker: MediaPayload::new(source),
            },
        )
    }

    pub fn location(
        to: impl Into<String>,
        latitude: f64,
        longitude: f64,
        name: Option<String>,
        address: Option<String>,
    ) -> Self {
        Self::new(
            to,
            OutgoingBody::Location {
                location: LocationPayload {
                    latitude,
                    longitude,
                    name,
                    address,
                },
            },
        )
    }

    pub fn interactive(to: impl Into<String>, interactive: InteractivePayload) -> Self {
        Self::new(to, OutgoingBody::Interactive { interactive })
    }

    /// Quote `message_id` in the recipient's chat
    #[must_use]
    pub fn reply_to(mut self, message_id: impl Into<String>) -> Self {
        self.context = Some(ReplyContext {
            message_id: message_id.into(),
        });
        self
    }

    /// Render a link preview for the first URL in a text message
    #[must_use]
    pub fn with_preview_url(mut self) -> Self {
        if let OutgoingBody::Text { text } = &mut self.body {
            text.preview_url = Some(true);
        }
        self
    }
}

/// Marks an inbound message as read (blue ticks)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReadReceipt {
    messaging_product: &'static str,
    status: &'static str,
    pub message_id: String,
}

impl ReadReceipt {
    pub fn new(message_id: impl Into<String>) -> Self {
        Self {
            messaging_product: "whatsapp",
            status: "read",
            message_id: message_id.into(),
        }
    }
}

// ============================================================================
// Interactive messages
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextHeader {
    #[serde(rename = "type")]
    kind: &'static str,
    pub text: String,
}

impl TextHeader {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            kind: "text",
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextSection {
    pub text: String,
}

impl TextSection {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplyButton {
    #[serde(rename = "type")]
    kind: &'static str,
    pub reply: ListRow,
}

impl ReplyButton {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            kind: "reply",
            reply: ListRow {
                id: id.into(),
                title: title.into(),
                description: None,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListRow {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListSection {
    pub title: String,
    pub rows: Vec<ListRow>,
}

/// Flow opening mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowOpenAction {
    /// Open straight on `screen`
    Navigate,
    /// Ask the data endpoint for the first screen (`INIT`)
    DataExchange,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowParameters {
    pub flow_message_version: String,
    pub flow_token: String,
    pub flow_id: String,
    pub flow_cta: String,
    pub flow_action: FlowOpenAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flow_action_payload: Option<FlowActionPayload>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowActionPayload {
    pub screen: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum InteractiveAction {
    Buttons {
        buttons: Vec<ReplyButton>,
    },
    List {
        button: String,
        sections: Vec<ListSection>,
    },
    Named {
        name: &'static str,
        #[serde(skip_serializing_if = "Option::is_none")]
        parameters: Option<serde_json::Value>,
    },
    Flow {
        name: &'static str,
        parameters: FlowParameters,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InteractivePayload {
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header: Option<TextHeader>,
    pub body: TextSection,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<TextSection>,
    pub action: InteractiveAction,
}

impl InteractivePayload {
    /// Up to three quick-reply buttons
    pub fn buttons(
        header: Option<String>,
        body: impl Into<String>,
        footer: Option<String>,
        buttons: Vec<ReplyButton>,
    ) -> Self {
        Self {
            kind: "button",
            header: header.map(TextHeader::new),
            body: TextSection::new(body),
            footer: footer.map(TextSection::new),
            action: InteractiveAction::Buttons { buttons },
        }
    }

    /// Menu of 1 to 10 sections opened by `button_title`
    pub fn list(
        header: Option<String>,
        body: impl Into<String>,
        footer: Option<String>,
        button_title: impl Into<String>,
        sections: Vec<ListSection>,
    ) -> Self {
        Self {
            kind: "list",
            header: header.map(TextHeader::new),
            body: TextSection::new(body),
            footer: footer.map(TextSection::new),
            action: InteractiveAction::List {
                button: button_title.into(),
                sections,
            },
        }
    }

    /// Button that opens `url` in the browser
    pub fn cta_url(
        header: Option<String>,
        body: impl Into<String>,
        footer: Option<String>,
        display_text: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            kind: "cta_url",
            header: header.map(TextHeader::new),
            body: TextSection::new(body),
            footer: footer.map(TextSection::new),
            action: InteractiveAction::Named {
                name: "cta_url",
                parameters: Some(serde_json::json!({
                    "display_text": display_text.into(),
                    "url": url.into(),
                })),
            },
        }
    }

    /// Ask the customer to share their location
    pub fn location_request(body: impl Into<String>) -> Self {
        Self {
            kind: "location_request_message",
            header: None,
            body: TextSection::new(body),
            footer: None,
            action: InteractiveAction::Named {
                name: "send_location",
                parameters: None,
            },
        }
    }

    /// Button that opens a flow; `flow_token` comes back on every data exchange
    pub fn flow(
        header: Option<String>,
        body: impl Into<String>,
        footer: Option<String>,
        parameters: FlowParameters,
    ) -> Self {
        Self {
            kind: "flow",
            header: header.map(TextHeader::new),
            body: TextSection::new(body),
            footer: footer.map(TextSection::new),
            action: InteractiveAction::Flow {
                name: "flow",
                parameters,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_text_reply_shape() {
        let msg = OutgoingMessage::text("5519900000000", "olleh")
            .reply_to("wamid.1")
            .with_preview_url();

        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({
                "messaging_product": "whatsapp",
                "recipient_type": "individual",
                "to": "5519900000000",
                "context": { "message_id": "wamid.1" },
                "type": "text",
                "text": { "body": "olleh", "preview_url": true }
            })
        );
    }

    #[test]
    fn test_image_by_id_with_caption() {
        let msg = OutgoingMessage::image(
            "5519900000000",
            MediaSource::Id("1479537139650973".into()),
            Some("menu".into()),
        );

        assert_eq!(
            serde_json::to_value(&msg).unwrap()["image"],
            json!({ "id": "1479537139650973", "caption": "menu" })
        );
    }

    #[test]
    fn test_button_message_shape() {
        let msg = OutgoingMessage::interactive(
            "5519900000000",
            InteractivePayload::buttons(
                Some("Order".into()),
                "Confirm?",
                None,
                vec![ReplyButton::new("yes", "Yes"), ReplyButton::new("no", "No")],
            ),
        );

        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "interactive");
        assert_eq!(value["interactive"]["type"], "button");
        assert_eq!(
            value["interactive"]["header"],
            json!({ "type": "text", "text": "Order" })
        );
        assert!(value["interactive"].get("footer").is_none());
        assert_eq!(
            value["interactive"]["action"]["buttons"][1],
            json!({ "type": "reply", "reply": { "id": "no", "title": "No" } })
        );
    }

    #[test]
    fn test_flow_message_shape() {
        let msg = OutgoingMessage::interactive(
            "5519900000000",
            InteractivePayload::flow(
                None,
                "Book a table",
                None,
                FlowParameters {
                    flow_message_version: "3".into(),
                    flow_token: "tok-1".into(),
                    flow_id: "1234".into(),
                    flow_cta: "Book".into(),
                    flow_action: FlowOpenAction::Navigate,
                    flow_action_payload: Some(FlowActionPayload {
                        screen: "WELCOME".into(),
                        data: None,
                    }),
                },
            ),
        );

        let action = &serde_json::to_value(&msg).unwrap()["interactive"]["action"];
        assert_eq!(action["name"], "flow");
        assert_eq!(action["parameters"]["flow_action"], "navigate");
        assert_eq!(action["parameters"]["flow_action_payload"]["screen"], "WELCOME");
    }

    #[test]
    fn test_read_receipt_shape() {
        assert_eq!(
            serde_json::to_value(ReadReceipt::new("wamid.1")).unwrap(),
            json!({ "messaging_product": "whatsapp", "status": "read", "message_id": "wamid.1" })
        );
    }
}
