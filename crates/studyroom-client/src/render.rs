//! Projection of the message store into a grouped, dated transcript.
//!
//! The renderer is a pure function: store contents plus a profile lookup in,
//! a [`Transcript`] view model out. The embedding UI draws the nodes and
//! applies the scroll directive; nothing here touches the DOM or the
//! network, which is what makes the grouping and scroll policies testable.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::Serialize;

use studyroom_shared::constants::{GROUPING_THRESHOLD_SECS, NEAR_BOTTOM_PX};
use studyroom_shared::{
    Attachment, AttachmentKind, AuthorProfile, DeliveryStatus, Message, MessageId, UserId,
};

/// What caused this render pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderTrigger {
    /// A snapshot, reconciliation, or enrichment-driven refresh.
    RemoteUpdate,
    /// The viewer's own send; always scrolls to the bottom.
    LocalSend,
}

/// Viewport geometry captured by the UI before the render, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Viewport {
    pub scroll_top: f64,
    pub height: f64,
    pub content_height: f64,
}

impl Viewport {
    fn distance_from_bottom(&self) -> f64 {
        (self.content_height - (self.scroll_top + self.height)).max(0.0)
    }
}

/// Where the UI should leave the scroll position after applying the render.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ScrollAnchor {
    /// Pin to the newest message.
    Bottom,
    /// Keep the viewer exactly where they were.
    Preserve { offset_px: f64 },
}

/// Renderer tuning knobs.
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Maximum gap between two same-author messages for them to merge into
    /// one visual block.
    pub grouping_threshold: chrono::Duration,
    /// Distance from the bottom within which a re-render keeps the view
    /// pinned to the newest message.
    pub near_bottom_px: f64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            grouping_threshold: chrono::Duration::seconds(GROUPING_THRESHOLD_SECS),
            near_bottom_px: NEAR_BOTTOM_PX,
        }
    }
}

/// The renderable body of one message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum MessageBody {
    Text { text: String },
    /// Inline preview with a full-view action.
    Image { url: String, name: String },
    /// Generic row with name/size/download action.
    File { url: String, name: String, size: u64 },
}

impl MessageBody {
    fn of(text: Option<&str>, attachment: Option<&Attachment>) -> Self {
        match attachment {
            Some(a) if a.kind == AttachmentKind::Image => Self::Image {
                url: a.url.clone(),
                name: a.name.clone(),
            },
            Some(a) => Self::File {
                url: a.url.clone(),
                name: a.name.clone(),
                size: a.size,
            },
            None => Self::Text {
                text: text.unwrap_or_default().to_string(),
            },
        }
    }
}

/// One rendered message row.
#[derive(Debug, Clone, Serialize)]
pub struct MessageView {
    pub id: MessageId,
    pub author: UserId,
    pub display_name: String,
    pub avatar_initial: String,
    pub photo_url: Option<String>,
    pub body: MessageBody,
    pub timestamp: DateTime<Utc>,
    pub status: DeliveryStatus,
    pub is_own: bool,
    pub is_system: bool,
    /// Whether to draw the author name/avatar above this row. `false` for
    /// rows continuing the previous author's block.
    pub show_header: bool,
}

/// One element of the rendered transcript, in display order.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "node", rename_all = "kebab-case")]
pub enum TranscriptNode {
    DateHeader { date: NaiveDate },
    Message(MessageView),
}

/// The full render output.
#[derive(Debug, Clone, Serialize)]
pub struct Transcript {
    pub nodes: Vec<TranscriptNode>,
    pub scroll: ScrollAnchor,
}

impl Transcript {
    /// The message rows in order, skipping date headers.
    pub fn rows(&self) -> impl Iterator<Item = &MessageView> {
        self.nodes.iter().filter_map(|node| match node {
            TranscriptNode::Message(view) => Some(view),
            TranscriptNode::DateHeader { .. } => None,
        })
    }
}

/// Render the store into a transcript.
///
/// `lookup` answers from the enrichment cache; a `None` renders the
/// deterministic fallback and gets patched in place once the
/// visible-range enricher resolves the author. Date bucketing uses the
/// caller's timezone so the separators match the viewer's calendar.
pub fn render_transcript<L, Tz>(
    messages: &[Message],
    lookup: L,
    viewer: &UserId,
    viewport: Option<Viewport>,
    trigger: RenderTrigger,
    config: &RenderConfig,
    tz: &Tz,
) -> Transcript
where
    L: Fn(&UserId) -> Option<AuthorProfile>,
    Tz: TimeZone,
{
    let mut nodes = Vec::with_capacity(messages.len() + 4);
    let mut prev: Option<&Message> = None;

    for message in messages {
        let date = message.timestamp.with_timezone(tz).date_naive();
        let new_bucket =
            prev.map_or(true, |p| p.timestamp.with_timezone(tz).date_naive() != date);
        if new_bucket {
            nodes.push(TranscriptNode::DateHeader { date });
        }

        // A row continues the previous block only within the same date
        // bucket, same author, inside the grouping threshold, and with no
        // system message on either side.
        let continued = !new_bucket
            && prev.is_some_and(|p| {
                !p.is_system
                    && !message.is_system
                    && p.author == message.author
                    && message.timestamp >= p.timestamp
                    && message.timestamp - p.timestamp <= config.grouping_threshold
            });

        let profile = if message.is_system {
            AuthorProfile::system()
        } else {
            lookup(&message.author).unwrap_or_else(|| AuthorProfile::fallback(&message.author))
        };

        nodes.push(TranscriptNode::Message(MessageView {
            id: message.id.clone(),
            author: message.author.clone(),
            display_name: profile.display_name,
            avatar_initial: profile.avatar_initial,
            photo_url: profile.photo_url,
            body: MessageBody::of(message.text.as_deref(), message.attachment.as_ref()),
            timestamp: message.timestamp,
            status: message.status,
            is_own: &message.author == viewer,
            is_system: message.is_system,
            show_header: !continued,
        }));

        prev = Some(message);
    }

    let scroll = match (trigger, viewport) {
        (RenderTrigger::LocalSend, _) => ScrollAnchor::Bottom,
        // Unmeasurable viewport: pinning to the bottom beats jumping to 0.
        (RenderTrigger::RemoteUpdate, None) => ScrollAnchor::Bottom,
        (RenderTrigger::RemoteUpdate, Some(vp)) => {
            if vp.distance_from_bottom() <= config.near_bottom_px {
                ScrollAnchor::Bottom
            } else {
                ScrollAnchor::Preserve {
                    offset_px: vp.scroll_top,
                }
            }
        }
    };

    Transcript { nodes, scroll }
}
