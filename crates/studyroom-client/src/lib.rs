//! # studyroom-client
//!
//! The embeddable room-chat core of the study-group client: per-room
//! message store with optimistic sends, the TTL-bounded author enrichment
//! cache, the deterministic transcript renderer, the viewport-aware
//! enrichment scheduler, and the [`RoomSession`] root object tying them to
//! the live feed subscriber.
//!
//! An embedding UI opens a session with [`RoomSession::open`], consumes
//! [`RoomEvent`]s to draw, and drives it through `send_message`,
//! `retry_send`, `notify_scrolled` and `close`.

pub mod cache;
pub mod enrich;
pub mod events;
pub mod render;
pub mod session;
pub mod store;

pub use cache::AuthorCache;
pub use enrich::{AuthorPatch, EnrichConfig, EnrichRow, ViewportProbe, VisibleRangeEnricher};
pub use events::RoomEvent;
pub use render::{
    render_transcript, MessageBody, MessageView, RenderConfig, RenderTrigger, ScrollAnchor,
    Transcript, TranscriptNode, Viewport,
};
pub use session::{RetryError, RoomConfig, RoomServices, RoomSession, SessionIdentity};
pub use store::MessageStore;

use tracing_subscriber::{fmt, EnvFilter};

/// Initialise tracing for an embedding application.
///
/// Honours `RUST_LOG`; otherwise defaults to debug for the workspace
/// crates and warn for everything else.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("studyroom_client=debug,studyroom_feed=debug,studyroom_store=info,warn")
    });

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
