//! Per-room orchestration.
//!
//! [`RoomSession`] is the root object a room view owns: it wires the
//! subscriber, the message store, the enrichment cache and the renderer
//! together and exposes the command surface (`send_message`, `retry_send`,
//! scroll notification, `close`). All state is instance state with the
//! view's lifetime; there are no process-wide singletons and no global
//! readiness flags: everything a session needs is injected at `open`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use chrono::{FixedOffset, Offset};
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use studyroom_feed::{
    spawn_subscriber, MessageFeed, MessageSender, ProfileService, StreamUpdate, SubscriberConfig,
    SubscriberHandle,
};
use studyroom_shared::{
    AuthorProfile, DeliveryStatus, Draft, MessageId, RoomId, SendError, UserId, ValidationError,
};
use studyroom_store::Database;

use crate::cache::AuthorCache;
use crate::enrich::{EnrichConfig, EnrichRow, ViewportProbe, VisibleRangeEnricher};
use crate::events::RoomEvent;
use crate::render::{render_transcript, RenderConfig, RenderTrigger, Transcript, Viewport};
use crate::store::MessageStore;

/// The local viewer, as established by the (out of scope) auth flow.
#[derive(Debug, Clone)]
pub struct SessionIdentity {
    pub user_id: UserId,
    pub profile: AuthorProfile,
}

/// Everything a session consumes, injected at `open`.
pub struct RoomServices {
    pub feed: Arc<dyn MessageFeed>,
    pub sender: Arc<dyn MessageSender>,
    pub profiles: Arc<dyn ProfileService>,
    /// Cross-session persisted profile cache. `None` keeps the cache
    /// memory-only.
    pub persisted: Option<Arc<std::sync::Mutex<Database>>>,
    pub probe: Arc<dyn ViewportProbe>,
}

/// Session tuning knobs.
#[derive(Debug, Clone)]
pub struct RoomConfig {
    pub subscriber: SubscriberConfig,
    pub render: RenderConfig,
    pub enrich: EnrichConfig,
    /// Timezone for date separators. Fixed so renders are deterministic;
    /// production callers pass the viewer's local offset.
    pub timezone: FixedOffset,
    pub event_capacity: usize,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            subscriber: SubscriberConfig::default(),
            render: RenderConfig::default(),
            enrich: EnrichConfig::default(),
            timezone: chrono::Utc.fix(),
            event_capacity: 64,
        }
    }
}

impl RoomConfig {
    /// Defaults, with date separators in the machine's local timezone.
    pub fn local() -> Self {
        Self {
            timezone: *chrono::Local::now().offset(),
            ..Self::default()
        }
    }
}

/// Failure of [`RoomSession::retry_send`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RetryError {
    #[error("No message with this id")]
    NotFound,

    #[error("Only failed messages can be retried")]
    NotFailed,

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// One open room view.
pub struct RoomSession {
    room: RoomId,
    identity: SessionIdentity,
    store: Mutex<MessageStore>,
    cache: Arc<AuthorCache>,
    sender: Arc<dyn MessageSender>,
    subscriber: SubscriberHandle,
    enricher: VisibleRangeEnricher,
    event_tx: mpsc::Sender<RoomEvent>,
    viewport: Mutex<Option<Viewport>>,
    closed: AtomicBool,
    config: RoomConfig,
    // Back-reference for handing owned clones to background send tasks.
    weak: Weak<RoomSession>,
}

impl RoomSession {
    /// Open a room view: spawn the subscriber and the bridge task, and
    /// return the session handle plus the event stream for the UI.
    pub fn open(
        room: RoomId,
        identity: SessionIdentity,
        services: RoomServices,
        config: RoomConfig,
    ) -> (Arc<Self>, mpsc::Receiver<RoomEvent>) {
        let (event_tx, event_rx) = mpsc::channel(config.event_capacity);
        let (patch_tx, patch_rx) = mpsc::channel(config.event_capacity);

        let cache = Arc::new(AuthorCache::new(
            services.profiles,
            services.persisted,
            identity.clone(),
        ));
        let enricher = VisibleRangeEnricher::new(
            cache.clone(),
            services.probe,
            patch_tx,
            config.enrich.clone(),
        );
        let (subscriber, update_rx) =
            spawn_subscriber(services.feed, room, config.subscriber.clone());

        let session = Arc::new_cyclic(|weak| Self {
            room,
            identity,
            store: Mutex::new(MessageStore::new()),
            cache,
            sender: services.sender,
            subscriber,
            enricher,
            event_tx,
            viewport: Mutex::new(None),
            closed: AtomicBool::new(false),
            config,
            weak: weak.clone(),
        });

        tokio::spawn(bridge_updates(session.clone(), update_rx));
        tokio::spawn(bridge_patches(session.clone(), patch_rx));

        info!(room = %room, viewer = %session.identity.user_id, "room session opened");
        (session, event_rx)
    }

    pub fn room(&self) -> RoomId {
        self.room
    }

    /// Validate and send a draft.
    ///
    /// Validation failures return before anything is stored or rendered.
    /// On pass, an optimistic `Sending` entry appears immediately (with
    /// force-scroll) and the network send proceeds in the background:
    /// confirmation reconciles the entry in place, a transport failure
    /// marks it `Failed` for a manual retry. Sends are never auto-retried.
    pub async fn send_message(&self, draft: Draft) -> Result<MessageId, ValidationError> {
        draft.validate()?;

        let temp = {
            let mut store = self.store.lock().await;
            store.append_optimistic(&draft, &self.identity.user_id)
        };
        self.render_and_emit(RenderTrigger::LocalSend).await;

        // The caller holds an Arc to this session, so the upgrade succeeds
        // until the view is torn down.
        if let Some(session) = self.weak.upgrade() {
            let temp_for_task = temp.clone();
            tokio::spawn(async move {
                session.run_send(temp_for_task, draft).await;
            });
        }

        Ok(temp)
    }

    /// Build a fresh attempt from a failed entry.
    ///
    /// The failed entry stays in history; the retry is a brand-new message
    /// with its own temp id, so flaky confirmations can never duplicate.
    pub async fn retry_send(&self, id: &MessageId) -> Result<MessageId, RetryError> {
        let draft = {
            let store = self.store.lock().await;
            let message = store.get(id).ok_or(RetryError::NotFound)?;
            if message.status != DeliveryStatus::Failed {
                return Err(RetryError::NotFailed);
            }
            Draft {
                text: message.text.clone(),
                attachment: message.attachment.clone(),
            }
        };
        debug!(failed = %id, "retrying as a new attempt");
        Ok(self.send_message(draft).await?)
    }

    /// The UI reports its viewport after a scroll; reschedules (debounced)
    /// enrichment and informs the next render's scroll policy.
    pub async fn notify_scrolled(&self, viewport: Option<Viewport>) {
        *self.viewport.lock().await = viewport;
        self.schedule_enrichment().await;
    }

    /// Tear the view down: stop the subscriber and release the feed
    /// listener. Idempotent.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(room = %self.room, "room session closing");
        self.subscriber.stop().await;
    }

    async fn run_send(&self, temp: MessageId, draft: Draft) {
        match self.sender.send(&self.room, &draft).await {
            Ok(canonical) => {
                debug!(temp = %temp, canonical = %canonical.id, "send confirmed");
                {
                    let mut store = self.store.lock().await;
                    store.reconcile(&temp, canonical);
                }
                self.render_and_emit(RenderTrigger::RemoteUpdate).await;
            }
            Err(e) => {
                match &e {
                    SendError::Transport(reason) => {
                        warn!(temp = %temp, reason = %reason, "send failed in transit")
                    }
                    SendError::Validation(reason) => {
                        warn!(temp = %temp, %reason, "backend rejected the message")
                    }
                }
                {
                    let mut store = self.store.lock().await;
                    store.mark_failed(&temp);
                }
                self.render_and_emit(RenderTrigger::RemoteUpdate).await;
            }
        }
    }

    async fn render_and_emit(&self, trigger: RenderTrigger) {
        let transcript = self.render(trigger).await;
        let _ = self
            .event_tx
            .send(RoomEvent::TranscriptChanged { transcript })
            .await;
    }

    async fn render(&self, trigger: RenderTrigger) -> Transcript {
        let viewport = *self.viewport.lock().await;
        let store = self.store.lock().await;
        render_transcript(
            store.messages(),
            |author| {
                if author == &self.identity.user_id {
                    Some(self.identity.profile.clone())
                } else {
                    self.cache.get(author)
                }
            },
            &self.identity.user_id,
            viewport,
            trigger,
            &self.config.render,
            &self.config.timezone,
        )
    }

    async fn schedule_enrichment(&self) {
        let rows: Vec<EnrichRow> = {
            let store = self.store.lock().await;
            store
                .messages()
                .iter()
                .map(|m| EnrichRow {
                    message_id: m.id.clone(),
                    author: m.author.clone(),
                    is_system: m.is_system,
                })
                .collect()
        };
        self.enricher.schedule(rows);
    }
}

/// Forward subscriber updates into the store / renderer / event stream.
async fn bridge_updates(session: Arc<RoomSession>, mut update_rx: mpsc::Receiver<StreamUpdate>) {
    while let Some(update) = update_rx.recv().await {
        match update {
            StreamUpdate::Snapshot(messages) => {
                {
                    let mut store = session.store.lock().await;
                    store.replace_all(messages);
                }
                session.render_and_emit(RenderTrigger::RemoteUpdate).await;
                session.schedule_enrichment().await;
            }
            StreamUpdate::Status(status) => {
                let _ = session
                    .event_tx
                    .send(RoomEvent::ConnectionChanged { status })
                    .await;
            }
        }
    }
    debug!(room = %session.room, "update bridge ended");
}

/// Forward enrichment patches into the event stream.
async fn bridge_patches(
    session: Arc<RoomSession>,
    mut patch_rx: mpsc::Receiver<Vec<crate::enrich::AuthorPatch>>,
) {
    while let Some(patches) = patch_rx.recv().await {
        let _ = session
            .event_tx
            .send(RoomEvent::AuthorsPatched { patches })
            .await;
    }
}
