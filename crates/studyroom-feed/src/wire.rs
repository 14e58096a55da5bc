//! Wire DTOs for the REST backend.
//!
//! Decoding is deliberately lenient: one malformed timestamp or an unknown
//! attachment kind must not abort the rendering of an otherwise valid
//! snapshot, so bad values degrade (with a warning) instead of erroring.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use studyroom_shared::{
    Attachment, AttachmentKind, DeliveryStatus, Draft, Message, MessageId, UserId,
};

/// A message as the backend serializes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDto {
    pub id: String,
    pub author_id: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub attachment: Option<AttachmentDto>,
    /// RFC-3339. Unparseable values fall back to "now".
    pub timestamp: String,
    #[serde(default)]
    pub is_system: bool,
}

impl MessageDto {
    /// Decode into the domain model, degrading bad fields instead of failing.
    pub fn into_message(self) -> Message {
        let timestamp = parse_timestamp(&self.id, &self.timestamp);
        Message {
            id: MessageId::canonical(self.id),
            author: UserId::new(self.author_id),
            text: self.text,
            attachment: self.attachment.map(AttachmentDto::into_attachment),
            timestamp,
            status: DeliveryStatus::Sent,
            is_system: self.is_system,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentDto {
    pub kind: String,
    pub url: String,
    pub name: String,
    pub size: u64,
    #[serde(default)]
    pub mime_type: String,
}

impl AttachmentDto {
    pub fn into_attachment(self) -> Attachment {
        let kind = match self.kind.as_str() {
            "image" => AttachmentKind::Image,
            "file" => AttachmentKind::File,
            other => {
                warn!(kind = other, "unknown attachment kind, treating as file");
                AttachmentKind::File
            }
        };
        Attachment {
            kind,
            url: self.url,
            name: self.name,
            size: self.size,
            mime_type: self.mime_type,
        }
    }

    pub fn from_attachment(attachment: &Attachment) -> Self {
        let kind = match attachment.kind {
            AttachmentKind::Image => "image",
            AttachmentKind::File => "file",
        };
        Self {
            kind: kind.to_string(),
            url: attachment.url.clone(),
            name: attachment.name.clone(),
            size: attachment.size,
            mime_type: attachment.mime_type.clone(),
        }
    }
}

/// Body of a send request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendBodyDto {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment: Option<AttachmentDto>,
}

impl SendBodyDto {
    pub fn from_draft(draft: &Draft) -> Self {
        Self {
            text: draft.text.clone(),
            attachment: draft.attachment.as_ref().map(AttachmentDto::from_attachment),
        }
    }
}

/// An author profile as the backend serializes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileDto {
    pub display_name: String,
    #[serde(default)]
    pub photo_url: Option<String>,
}

impl ProfileDto {
    pub fn into_profile(self) -> studyroom_shared::AuthorProfile {
        studyroom_shared::AuthorProfile::new(self.display_name, self.photo_url)
    }
}

fn parse_timestamp(message_id: &str, raw: &str) -> DateTime<Utc> {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(dt) => dt.with_timezone(&Utc),
        Err(e) => {
            warn!(
                message = message_id,
                raw,
                error = %e,
                "unparseable timestamp, falling back to now"
            );
            Utc::now()
        }
    }
}
