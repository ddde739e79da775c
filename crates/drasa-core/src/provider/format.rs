//! Conversion from conversation messages to the chat-completions message schema.

use serde::Serialize;

use crate::types::{AttachmentPayload, Message, Role};

/// Prompt used when an image is sent without any text.
pub const DEFAULT_IMAGE_PROMPT: &str = "What is in this image?";

/// A message in the provider's wire format.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WireMessage {
    pub role: &'static str,
    pub content: MessageContent,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageUrl {
    pub url: String,
}

pub type ProviderPayload = Vec<WireMessage>;

fn wire_role(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        _ => "assistant",
    }
}

/// Format `messages` for the provider.
///
/// Text turns keep the whole history in order. A turn with attachments is sent
/// alone as one user message of content blocks; only image attachments become
/// blocks, other files are left out of the request.
pub fn format_messages(messages: &[Message], attachments_present: bool) -> ProviderPayload {
    if attachments_present {
        return vec![multimodal_turn(messages.last())];
    }

    messages
        .iter()
        .map(|m| WireMessage {
            role: wire_role(m.role),
            content: MessageContent::Text(m.text.clone()),
        })
        .collect()
}

fn multimodal_turn(last: Option<&Message>) -> WireMessage {
    let text = last
        .map(|m| m.text.as_str())
        .filter(|t| !t.is_empty())
        .unwrap_or(DEFAULT_IMAGE_PROMPT);

    let mut parts = vec![ContentPart::Text {
        text: text.to_string(),
    }];

    let images = last
        .and_then(|m| m.attachments.as_deref())
        .unwrap_or_default()
        .iter()
        .filter(|a| a.is_image());
    for image in images {
        if let AttachmentPayload::DataUrl(url) = &image.payload {
            parts.push(ContentPart::ImageUrl {
                image_url: ImageUrl { url: url.clone() },
            });
        }
    }

    WireMessage {
        role: "user",
        content: MessageContent::Parts(parts),
    }
}
