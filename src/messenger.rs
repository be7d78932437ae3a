//! Messenger platform wire types.

use serde::{Deserialize, Serialize};

/// Webhook delivery envelope
#[derive(Debug, Deserialize)]
pub struct WebhookEnvelope {
    /// `page` for page subscriptions
    #[serde(default)]
    pub object: String,
    /// Batched entries
    #[serde(default)]
    pub entry: Vec<WebhookEntry>,
}

/// One entry of a delivery
#[derive(Debug, Deserialize)]
pub struct WebhookEntry {
    /// Only the first event is ever looked at
    #[serde(default)]
    pub messaging: Vec<MessagingEvent>,
}

/// A single messaging event
#[derive(Debug, Deserialize)]
pub struct MessagingEvent {
    /// Who sent it. Some event kinds (opt-ins via `user_ref`) have no sender.
    #[serde(default)]
    pub sender: Option<Participant>,
    /// Set for message events
    pub message: Option<InboundMessage>,
    /// Set for postback events
    pub postback: Option<Postback>,
}

/// Sender or recipient
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Participant {
    /// Page-scoped id
    pub id: String,
}

/// Message body of an event
#[derive(Clone, Debug, Default, Deserialize)]
pub struct InboundMessage {
    /// Message id
    #[serde(default)]
    pub mid: String,
    /// Text, absent for attachment-only messages
    pub text: Option<String>,
    /// Attachments, if any
    #[serde(default)]
    pub attachments: Vec<InboundAttachment>,
}

impl InboundMessage {
    /// Non-empty text, if any.
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref().filter(|text| !text.is_empty())
    }
}

/// An attachment on an inbound message
#[derive(Clone, Debug, Deserialize)]
pub struct InboundAttachment {
    /// `image`, `video`, `file`, ...
    #[serde(rename = "type")]
    pub kind: String,
    /// Where to fetch it from
    #[serde(default)]
    pub payload: Option<AttachmentLocation>,
}

impl InboundAttachment {
    /// True for picture attachments.
    pub fn is_image(&self) -> bool {
        self.kind == "image"
    }

    /// URL of the attachment, if the platform sent one.
    pub fn url(&self) -> Option<&str> {
        self.payload.as_ref().and_then(|payload| payload.url.as_deref())
    }
}

/// Attachment payload
#[derive(Clone, Debug, Deserialize)]
pub struct AttachmentLocation {
    /// Download URL
    pub url: Option<String>,
}

/// Postback (button press) body
#[derive(Clone, Debug, Deserialize)]
pub struct Postback {
    /// Developer-defined payload
    pub payload: Option<String>,
}

/// What we reply with
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OutboundMessage {
    /// Plain text
    Text {
        /// Message text
        text: String,
    },
    /// A picture by URL
    Attachment {
        /// The picture
        attachment: OutboundAttachment,
    },
}

impl OutboundMessage {
    /// A text reply.
    pub fn text(text: &str) -> Self {
        Self::Text {
            text: text.to_string(),
        }
    }

    /// A reusable picture reply.
    pub fn image(url: &str) -> Self {
        Self::Attachment {
            attachment: OutboundAttachment {
                kind: "image".to_string(),
                payload: OutboundAttachmentPayload {
                    url: url.to_string(),
                    is_reusable: true,
                },
            },
        }
    }
}

/// Attachment reply body
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct OutboundAttachment {
    /// Always `image` here
    #[serde(rename = "type")]
    pub kind: String,
    /// Where the platform fetches it
    pub payload: OutboundAttachmentPayload,
}

/// Attachment reply payload
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct OutboundAttachmentPayload {
    /// Public URL of the picture
    pub url: String,
    /// Lets the platform cache the upload
    pub is_reusable: bool,
}

/// Body POSTed to the send API
#[derive(Debug, Serialize)]
pub struct SendEnvelope<'a> {
    /// Who receives it
    pub recipient: Participant,
    /// What they receive
    pub message: &'a OutboundMessage,
}
