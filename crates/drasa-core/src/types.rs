use base64::Engine;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::StoreError;

/// Largest attachment accepted from the user (10 MiB).
pub const MAX_ATTACHMENT_BYTES: u64 = 10 * 1024 * 1024;

/// Message role in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    #[serde(alias = "ai")]
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// How an attachment's bytes are carried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "encoding", content = "data", rename_all = "snake_case")]
pub enum AttachmentPayload {
    /// `data:<mime>;base64,<bytes>`
    DataUrl(String),
    /// Raw file contents for plain-text files.
    Text(String),
}

/// A file attached to a user message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub name: String,
    pub mime_type: String,
    pub size_bytes: u64,
    pub payload: AttachmentPayload,
}

impl Attachment {
    /// Encode raw file bytes. Images and unknown binary types become a data URL;
    /// `text/plain` (or a `.txt` name) is kept as text.
    pub fn from_bytes(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        bytes: &[u8],
    ) -> Result<Self, StoreError> {
        let name = name.into();
        let mime_type = mime_type.into();
        let size_bytes = bytes.len() as u64;
        if size_bytes > MAX_ATTACHMENT_BYTES {
            return Err(StoreError::AttachmentTooLarge {
                name,
                size: size_bytes,
                max: MAX_ATTACHMENT_BYTES,
            });
        }

        let is_text = !mime_type.starts_with("image/")
            && (mime_type == "text/plain" || name.ends_with(".txt"));

        let payload = match (is_text, std::str::from_utf8(bytes)) {
            (true, Ok(text)) => AttachmentPayload::Text(text.to_string()),
            _ => AttachmentPayload::DataUrl(format!(
                "data:{};base64,{}",
                mime_type,
                base64::engine::general_purpose::STANDARD.encode(bytes)
            )),
        };

        Ok(Self {
            name,
            mime_type,
            size_bytes,
            payload,
        })
    }

    /// Read and encode a file from disk, guessing the mime type from its extension.
    pub fn from_path(path: &Path) -> Result<Self, StoreError> {
        let meta = std::fs::metadata(path).map_err(|e| StoreError::Read(e.to_string()))?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("attachment")
            .to_string();
        if meta.len() > MAX_ATTACHMENT_BYTES {
            return Err(StoreError::AttachmentTooLarge {
                name,
                size: meta.len(),
                max: MAX_ATTACHMENT_BYTES,
            });
        }
        let bytes = std::fs::read(path).map_err(|e| StoreError::Read(e.to_string()))?;
        Self::from_bytes(name, guess_mime_type(path), &bytes)
    }

    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }
}

/// Best-effort mime type from a file extension.
pub fn guess_mime_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "svg" => "image/svg+xml",
        "txt" => "text/plain",
        "md" => "text/markdown",
        "json" => "application/json",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachments: Option<Vec<Attachment>>,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            attachments: None,
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
            attachments: None,
        }
    }

    pub fn user_with_attachments(text: impl Into<String>, attachments: Vec<Attachment>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            attachments: if attachments.is_empty() {
                None
            } else {
                Some(attachments)
            },
        }
    }

    pub fn has_attachments(&self) -> bool {
        self.attachments.as_ref().is_some_and(|a| !a.is_empty())
    }
}

/// Token usage information.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

/// A successful reply from one provider call.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    /// Model the provider reports having used, which may differ from the one requested.
    pub model: String,
    pub usage: Option<TokenUsage>,
}

/// The only shape handed back to the front-end for a chat turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseResult {
    pub success: bool,
    pub text: String,
    pub model_used: String,
}

impl ResponseResult {
    pub const ERROR_MODEL: &'static str = "error";

    pub fn success(text: impl Into<String>, model_used: impl Into<String>) -> Self {
        Self {
            success: true,
            text: text.into(),
            model_used: model_used.into(),
        }
    }

    pub fn failure(text: impl Into<String>) -> Self {
        Self {
            success: false,
            text: text.into(),
            model_used: Self::ERROR_MODEL.to_string(),
        }
    }
}
