//! The message and draft models.
//!
//! Everything derives `Serialize`/`Deserialize` so it can be handed directly
//! to an embedding UI layer as event payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{MAX_ATTACHMENT_BYTES, MAX_TEXT_CHARS};
use crate::error::ValidationError;
use crate::types::{MessageId, UserId};

/// What kind of attachment a message carries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    Image,
    File,
}

/// Descriptor of an already-uploaded attachment.
///
/// The upload itself happens elsewhere; this crate only carries the
/// resulting descriptor through the send path and the transcript.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Attachment {
    pub kind: AttachmentKind,
    pub url: String,
    pub name: String,
    /// Size in bytes, as reported by the upload service.
    pub size: u64,
    pub mime_type: String,
}

/// Delivery status of a message, meaningful only for messages the local
/// viewer authored in this session.
///
/// A message moves `Sending -> Sent` or `Sending -> Failed` exactly once.
/// Retrying a failed send creates a new attempt instead of mutating the
/// failed entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Sending,
    Sent,
    Failed,
}

/// A single chat message as held by the message store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub author: UserId,
    /// Plain text body. In practice mutually exclusive with `attachment`,
    /// but not structurally enforced.
    pub text: Option<String>,
    pub attachment: Option<Attachment>,
    /// Client clock until the server assigns the canonical timestamp.
    pub timestamp: DateTime<Utc>,
    pub status: DeliveryStatus,
    /// System announcements bypass author enrichment and render with a
    /// fixed label.
    pub is_system: bool,
}

impl Message {
    /// A confirmed message as delivered by the feed.
    pub fn canonical(
        id: impl Into<String>,
        author: UserId,
        text: Option<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: MessageId::canonical(id),
            author,
            text,
            attachment: None,
            timestamp,
            status: DeliveryStatus::Sent,
            is_system: false,
        }
    }

    /// A room announcement (joins, renames, ...).
    pub fn system(id: impl Into<String>, text: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: MessageId::canonical(id),
            author: UserId::system(),
            text: Some(text.into()),
            attachment: None,
            timestamp,
            status: DeliveryStatus::Sent,
            is_system: true,
        }
    }
}

/// An outgoing message before it has been accepted by the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Draft {
    pub text: Option<String>,
    pub attachment: Option<Attachment>,
}

impl Draft {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            attachment: None,
        }
    }

    pub fn attachment(attachment: Attachment) -> Self {
        Self {
            text: None,
            attachment: Some(attachment),
        }
    }

    /// Check the local send preconditions.
    ///
    /// Validation failures are surfaced to the caller synchronously and
    /// never reach the message store or the network.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let has_text = self
            .text
            .as_deref()
            .is_some_and(|t| !t.trim().is_empty());

        if !has_text && self.attachment.is_none() {
            return Err(ValidationError::Empty);
        }

        if let Some(text) = &self.text {
            let chars = text.chars().count();
            if chars > MAX_TEXT_CHARS {
                return Err(ValidationError::TextTooLong {
                    chars,
                    max: MAX_TEXT_CHARS,
                });
            }
        }

        if let Some(attachment) = &self.attachment {
            if attachment.size > MAX_ATTACHMENT_BYTES {
                return Err(ValidationError::AttachmentTooLarge {
                    size: attachment.size,
                    max: MAX_ATTACHMENT_BYTES,
                });
            }
        }

        Ok(())
    }
}
