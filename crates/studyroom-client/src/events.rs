//! Events delivered from a [`RoomSession`] to the embedding UI layer.
//!
//! The session owns all state; the UI is a pure consumer that re-renders on
//! [`RoomEvent::TranscriptChanged`], shows a reconnect notice while the
//! connection status is `retrying`, and patches individual rows on
//! [`RoomEvent::AuthorsPatched`]. Payloads serialize to JSON so they can be
//! forwarded over an IPC or WebSocket boundary unchanged.
//!
//! [`RoomSession`]: crate::session::RoomSession

use serde::Serialize;

use studyroom_feed::StreamStatus;

use crate::enrich::AuthorPatch;
use crate::render::Transcript;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum RoomEvent {
    /// The transcript view model changed; redraw and apply the scroll
    /// directive.
    TranscriptChanged { transcript: Transcript },

    /// The live feed's connection state changed. `retrying` carries the
    /// delay before the next attempt; the notice stays up until `live`.
    ConnectionChanged { status: StreamStatus },

    /// Author metadata resolved for already-rendered rows; patch each row
    /// in place, no re-render.
    AuthorsPatched { patches: Vec<AuthorPatch> },
}
