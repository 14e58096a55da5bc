//! Live-feed subscriber with explicit reconnect/backoff state machine.
//!
//! The subscriber runs in a dedicated tokio task. External code talks to it
//! through a command channel (held by [`SubscriberHandle`]) and receives
//! [`StreamUpdate`]s on the channel returned by [`spawn_subscriber`], keeping
//! the transport layer fully asynchronous and decoupled from the room view.
//!
//! State machine: `Idle -> Connecting -> Live <-> Retrying`, with `Idle`
//! reachable from every state via `stop()`. Consecutive failures double the
//! retry delay up to a ceiling; any successful delivery resets it to the
//! base. There is no give-up state: a dead backend keeps the subscriber in
//! `Retrying` until the room view is torn down.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use studyroom_shared::constants::{BACKOFF_BASE_MS, BACKOFF_CEILING_MS, CONNECT_WATCHDOG_SECS};
use studyroom_shared::{FeedError, Message, RoomId};

use crate::services::{FeedEvent, MessageFeed};

// ---------------------------------------------------------------------------
// Command / update types
// ---------------------------------------------------------------------------

/// Commands sent *into* the subscriber task.
#[derive(Debug)]
enum SubscriberCommand {
    /// Tear the subscription down and land in `Idle`.
    Stop,
}

/// The subscriber's externally visible state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamState {
    Idle,
    Connecting,
    Live,
    Retrying,
    /// The task tore down without an explicit `stop()` (the update channel
    /// was dropped). Never entered while a consumer is listening.
    Failed,
}

/// A state transition, including how long until the next attempt when
/// `Retrying`. The UI shows a persistent reconnecting notice while in
/// `Retrying`; it must not clear the message store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StreamStatus {
    pub state: StreamState,
    /// Delay before the next subscription attempt, in milliseconds.
    /// Only set while `Retrying`.
    pub retry_in_ms: Option<u64>,
}

impl StreamStatus {
    fn new(state: StreamState) -> Self {
        Self {
            state,
            retry_in_ms: None,
        }
    }
}

/// Updates sent *from* the subscriber task to the room view.
#[derive(Debug, Clone)]
pub enum StreamUpdate {
    /// A full ordered snapshot, delivered only while `Live`.
    Snapshot(Vec<Message>),
    /// A state transition.
    Status(StreamStatus),
}

// ---------------------------------------------------------------------------
// Backoff
// ---------------------------------------------------------------------------

/// Doubling backoff with a ceiling.
///
/// The Nth consecutive failure since the last success waits
/// `min(base * 2^(N-1), ceiling)`.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    ceiling: Duration,
    next: Duration,
}

impl Backoff {
    pub fn new(base: Duration, ceiling: Duration) -> Self {
        Self {
            base,
            ceiling,
            next: base,
        }
    }

    /// The delay to wait before the next attempt. Doubles the following
    /// delay, saturating at the ceiling.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = self.ceiling.min(delay.saturating_mul(2));
        delay
    }

    /// Called on any successful delivery.
    pub fn reset(&mut self) {
        self.next = self.base;
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Subscriber tuning knobs.
///
/// The backoff constants are deliberately configuration rather than
/// contract; the defaults match the documented policy (1s base, doubling,
/// 30s ceiling).
#[derive(Debug, Clone)]
pub struct SubscriberConfig {
    /// Delay before the first resubscription attempt.
    /// Env: `STUDYROOM_BACKOFF_BASE_MS`
    pub backoff_base: Duration,

    /// Ceiling on the resubscription delay.
    /// Env: `STUDYROOM_BACKOFF_CEILING_MS`
    pub backoff_ceiling: Duration,

    /// How long a subscription attempt may stay silent before it is treated
    /// as a transport failure.
    /// Env: `STUDYROOM_CONNECT_WATCHDOG_SECS`
    pub connect_watchdog: Duration,

    /// Capacity of the feed and update channels.
    pub channel_capacity: usize,
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            backoff_base: Duration::from_millis(BACKOFF_BASE_MS),
            backoff_ceiling: Duration::from_millis(BACKOFF_CEILING_MS),
            connect_watchdog: Duration::from_secs(CONNECT_WATCHDOG_SECS),
            channel_capacity: 256,
        }
    }
}

impl SubscriberConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults. Unparseable values are logged and ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(ms) = env_u64("STUDYROOM_BACKOFF_BASE_MS") {
            config.backoff_base = Duration::from_millis(ms);
        }
        if let Some(ms) = env_u64("STUDYROOM_BACKOFF_CEILING_MS") {
            config.backoff_ceiling = Duration::from_millis(ms);
        }
        if let Some(secs) = env_u64("STUDYROOM_CONNECT_WATCHDOG_SECS") {
            config.connect_watchdog = Duration::from_secs(secs);
        }

        config
    }
}

fn env_u64(name: &str) -> Option<u64> {
    let raw = std::env::var(name).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(var = name, value = %raw, "ignoring unparseable environment variable");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Handle to a running subscriber task.
#[derive(Debug, Clone)]
pub struct SubscriberHandle {
    cmd_tx: mpsc::Sender<SubscriberCommand>,
    state_rx: watch::Receiver<StreamState>,
}

impl SubscriberHandle {
    /// The subscriber's current state.
    pub fn state(&self) -> StreamState {
        *self.state_rx.borrow()
    }

    /// Tear the subscription down.
    ///
    /// Idempotent and safe from any state: a second `stop()`, or one issued
    /// after the task already exited, is a no-op.
    pub async fn stop(&self) {
        let _ = self.cmd_tx.send(SubscriberCommand::Stop).await;
    }
}

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

/// Spawn the subscriber for one room in a background tokio task.
///
/// Returns the control handle and the update channel. Dropping the receiver
/// tears the task down (`Failed`); calling [`SubscriberHandle::stop`] tears
/// it down cleanly (`Idle`).
pub fn spawn_subscriber(
    feed: Arc<dyn MessageFeed>,
    room: RoomId,
    config: SubscriberConfig,
) -> (SubscriberHandle, mpsc::Receiver<StreamUpdate>) {
    let (cmd_tx, cmd_rx) = mpsc::channel(8);
    let (update_tx, update_rx) = mpsc::channel(config.channel_capacity);
    let (state_tx, state_rx) = watch::channel(StreamState::Idle);

    tokio::spawn(async move {
        let final_state = run_subscriber(feed, room, config, cmd_rx, &update_tx, &state_tx).await;
        let _ = state_tx.send(final_state);
        let _ = update_tx.send(StreamUpdate::Status(StreamStatus::new(final_state))).await;
        info!(room = %room, state = ?final_state, "subscriber stopped");
    });

    (SubscriberHandle { cmd_tx, state_rx }, update_rx)
}

/// The subscriber event loop. Returns the state to report on exit.
async fn run_subscriber(
    feed: Arc<dyn MessageFeed>,
    room: RoomId,
    config: SubscriberConfig,
    mut cmd_rx: mpsc::Receiver<SubscriberCommand>,
    update_tx: &mpsc::Sender<StreamUpdate>,
    state_tx: &watch::Sender<StreamState>,
) -> StreamState {
    let mut backoff = Backoff::new(config.backoff_base, config.backoff_ceiling);
    let mut consecutive_failures: u32 = 0;
    // Set once the handle is dropped without stop(); the command arm must
    // then be disabled or recv() would return None in a hot loop.
    let mut handle_gone = false;

    loop {
        // --- Connecting: open a fresh subscription -----------------------
        let _ = state_tx.send(StreamState::Connecting);
        if update_tx
            .send(StreamUpdate::Status(StreamStatus::new(StreamState::Connecting)))
            .await
            .is_err()
        {
            return StreamState::Failed;
        }

        let (feed_tx, mut feed_rx) = mpsc::channel(config.channel_capacity);
        let subscription = feed.subscribe(&room, feed_tx);
        debug!(room = %room, "subscription attempt opened");

        let watchdog = tokio::time::sleep(config.connect_watchdog);
        tokio::pin!(watchdog);

        let mut live = false;

        // --- Connecting / Live: wait for deliveries ----------------------
        let failure = loop {
            tokio::select! {
                cmd = cmd_rx.recv(), if !handle_gone => {
                    match cmd {
                        Some(SubscriberCommand::Stop) => {
                            subscription.cancel();
                            return StreamState::Idle;
                        }
                        // Handle dropped without stop(): keep serving the
                        // update receiver until it goes away too.
                        None => {
                            handle_gone = true;
                            continue;
                        }
                    }
                }

                event = feed_rx.recv() => {
                    match event {
                        Some(FeedEvent::Snapshot(messages)) => {
                            if !live {
                                live = true;
                                consecutive_failures = 0;
                                let _ = state_tx.send(StreamState::Live);
                                if update_tx
                                    .send(StreamUpdate::Status(StreamStatus::new(StreamState::Live)))
                                    .await
                                    .is_err()
                                {
                                    subscription.cancel();
                                    return StreamState::Failed;
                                }
                            }
                            // Every successful delivery resets the backoff.
                            backoff.reset();
                            debug!(room = %room, count = messages.len(), "snapshot delivered");
                            if update_tx.send(StreamUpdate::Snapshot(messages)).await.is_err() {
                                subscription.cancel();
                                return StreamState::Failed;
                            }
                        }
                        Some(FeedEvent::Error(e)) => break e,
                        // The feed dropped its sender without an error event.
                        None => break FeedError::Transport("feed closed the event channel".into()),
                    }
                }

                // A silent Connecting attempt follows the transport path.
                _ = &mut watchdog, if !live => {
                    break FeedError::Timeout(config.connect_watchdog.as_secs());
                }
            }
        };

        // --- Retrying: back off, then resubscribe from scratch -----------
        subscription.cancel();
        consecutive_failures += 1;
        let delay = backoff.next_delay();
        warn!(
            room = %room,
            error = %failure,
            failures = consecutive_failures,
            retry_in_ms = delay.as_millis() as u64,
            "live feed broke, backing off"
        );

        let _ = state_tx.send(StreamState::Retrying);
        let status = StreamStatus {
            state: StreamState::Retrying,
            retry_in_ms: Some(delay.as_millis() as u64),
        };
        if update_tx.send(StreamUpdate::Status(status)).await.is_err() {
            return StreamState::Failed;
        }

        // The retry timer is cancellable at any point via stop().
        if handle_gone {
            tokio::time::sleep(delay).await;
        } else {
            tokio::select! {
                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(SubscriberCommand::Stop) => return StreamState::Idle,
                        None => {
                            // Handle gone; wait out the delay and keep going
                            // for the update receiver.
                            handle_gone = true;
                            tokio::time::sleep(delay).await;
                        }
                    }
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use studyroom_shared::UserId;

    use crate::memory::InMemoryFeed;

    fn fast_config() -> SubscriberConfig {
        SubscriberConfig {
            backoff_base: Duration::from_millis(10),
            backoff_ceiling: Duration::from_millis(80),
            connect_watchdog: Duration::from_millis(200),
            channel_capacity: 16,
        }
    }

    fn snapshot_of(n: usize) -> Vec<Message> {
        (0..n)
            .map(|i| {
                Message::canonical(
                    format!("m-{i}"),
                    UserId::new("ana"),
                    Some(format!("msg {i}")),
                    chrono::Utc::now(),
                )
            })
            .collect()
    }

    async fn next_status(rx: &mut mpsc::Receiver<StreamUpdate>) -> StreamStatus {
        loop {
            match rx.recv().await.expect("update channel open") {
                StreamUpdate::Status(status) => return status,
                StreamUpdate::Snapshot(_) => continue,
            }
        }
    }

    #[test]
    fn backoff_doubles_to_the_ceiling() {
        let mut backoff = Backoff::new(Duration::from_millis(1000), Duration::from_millis(30_000));

        let delays: Vec<u64> = (0..7).map(|_| backoff.next_delay().as_millis() as u64).collect();
        // min(1000 * 2^(N-1), 30000)
        assert_eq!(delays, vec![1000, 2000, 4000, 8000, 16_000, 30_000, 30_000]);
    }

    #[test]
    fn backoff_resets_to_base_on_success() {
        let mut backoff = Backoff::new(Duration::from_millis(1000), Duration::from_millis(30_000));

        for _ in 0..4 {
            backoff.next_delay();
        }
        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_millis(1000));
        assert_eq!(backoff.next_delay(), Duration::from_millis(2000));
    }

    #[tokio::test]
    async fn delivers_snapshots_while_live() {
        let feed = Arc::new(InMemoryFeed::new());
        let room = RoomId::new();
        let (handle, mut rx) = spawn_subscriber(feed.clone(), room, fast_config());

        assert_eq!(next_status(&mut rx).await.state, StreamState::Connecting);
        feed.wait_for_subscriber(&room).await;

        feed.push_snapshot(&room, snapshot_of(2));
        assert_eq!(next_status(&mut rx).await.state, StreamState::Live);
        match rx.recv().await.unwrap() {
            StreamUpdate::Snapshot(messages) => assert_eq!(messages.len(), 2),
            other => panic!("expected snapshot, got {other:?}"),
        }

        handle.stop().await;
        assert_eq!(next_status(&mut rx).await.state, StreamState::Idle);
    }

    #[tokio::test]
    async fn error_triggers_retry_and_resubscription() {
        let feed = Arc::new(InMemoryFeed::new());
        let room = RoomId::new();
        let (handle, mut rx) = spawn_subscriber(feed.clone(), room, fast_config());

        assert_eq!(next_status(&mut rx).await.state, StreamState::Connecting);
        feed.wait_for_subscriber(&room).await;
        feed.push_snapshot(&room, snapshot_of(1));
        assert_eq!(next_status(&mut rx).await.state, StreamState::Live);

        feed.push_error(&room, FeedError::Transport("gone".into()));
        let retrying = next_status(&mut rx).await;
        assert_eq!(retrying.state, StreamState::Retrying);
        assert_eq!(retrying.retry_in_ms, Some(10));

        // After the delay a fresh attempt is made and goes live again.
        assert_eq!(next_status(&mut rx).await.state, StreamState::Connecting);
        feed.wait_for_subscriber(&room).await;
        feed.push_snapshot(&room, snapshot_of(1));
        assert_eq!(next_status(&mut rx).await.state, StreamState::Live);

        handle.stop().await;
    }

    #[tokio::test]
    async fn consecutive_failures_double_the_delay_and_success_resets_it() {
        let feed = Arc::new(InMemoryFeed::new());
        let room = RoomId::new();
        let (handle, mut rx) = spawn_subscriber(feed.clone(), room, fast_config());

        let mut seen_delays = Vec::new();
        for _ in 0..4 {
            loop {
                let status = next_status(&mut rx).await;
                match status.state {
                    StreamState::Connecting => {
                        feed.wait_for_subscriber(&room).await;
                        feed.push_error(&room, FeedError::Transport("down".into()));
                    }
                    StreamState::Retrying => {
                        seen_delays.push(status.retry_in_ms.unwrap());
                        break;
                    }
                    other => panic!("unexpected state {other:?}"),
                }
            }
        }
        // 10 -> 20 -> 40 -> 80 (ceiling).
        assert_eq!(seen_delays, vec![10, 20, 40, 80]);

        // One successful delivery resets the ladder.
        loop {
            let status = next_status(&mut rx).await;
            if status.state == StreamState::Connecting {
                feed.wait_for_subscriber(&room).await;
                feed.push_snapshot(&room, snapshot_of(1));
                break;
            }
        }
        assert_eq!(next_status(&mut rx).await.state, StreamState::Live);
        let _ = rx.recv().await; // the snapshot

        feed.push_error(&room, FeedError::Transport("down again".into()));
        let retrying = next_status(&mut rx).await;
        assert_eq!(retrying.state, StreamState::Retrying);
        assert_eq!(retrying.retry_in_ms, Some(10));

        handle.stop().await;
    }

    #[tokio::test]
    async fn silent_attempt_times_out_into_the_backoff_path() {
        let config = SubscriberConfig {
            connect_watchdog: Duration::from_millis(30),
            ..fast_config()
        };
        let feed = Arc::new(InMemoryFeed::new());
        let room = RoomId::new();
        let (handle, mut rx) = spawn_subscriber(feed, room, config);

        assert_eq!(next_status(&mut rx).await.state, StreamState::Connecting);
        // Deliver nothing: the watchdog must fire.
        let retrying = next_status(&mut rx).await;
        assert_eq!(retrying.state, StreamState::Retrying);
        assert_eq!(retrying.retry_in_ms, Some(10));

        handle.stop().await;
    }

    #[tokio::test]
    async fn stop_is_idempotent_from_every_state() {
        let feed = Arc::new(InMemoryFeed::new());
        let room = RoomId::new();
        let (handle, mut rx) = spawn_subscriber(feed.clone(), room, fast_config());

        // Stop while Connecting, twice.
        assert_eq!(next_status(&mut rx).await.state, StreamState::Connecting);
        handle.stop().await;
        handle.stop().await;
        assert_eq!(next_status(&mut rx).await.state, StreamState::Idle);
        assert_eq!(handle.state(), StreamState::Idle);

        // Stop while Retrying cancels the pending retry timer.
        let config = SubscriberConfig {
            backoff_base: Duration::from_secs(3600),
            backoff_ceiling: Duration::from_secs(3600),
            ..fast_config()
        };
        let (handle, mut rx) = spawn_subscriber(feed.clone(), room, config);
        assert_eq!(next_status(&mut rx).await.state, StreamState::Connecting);
        feed.wait_for_subscriber(&room).await;
        feed.push_error(&room, FeedError::Transport("down".into()));
        assert_eq!(next_status(&mut rx).await.state, StreamState::Retrying);

        let stopped = tokio::time::timeout(Duration::from_millis(500), async {
            handle.stop().await;
            next_status(&mut rx).await
        })
        .await
        .expect("stop must not wait out the retry timer");
        assert_eq!(stopped.state, StreamState::Idle);
    }

    #[tokio::test]
    async fn dropping_the_update_receiver_fails_the_task() {
        let feed = Arc::new(InMemoryFeed::new());
        let room = RoomId::new();
        let (handle, rx) = spawn_subscriber(feed.clone(), room, fast_config());

        drop(rx);

        let mut state_rx = handle.state_rx.clone();
        tokio::time::timeout(Duration::from_millis(500), async {
            while *state_rx.borrow() != StreamState::Failed {
                state_rx.changed().await.unwrap();
            }
        })
        .await
        .expect("task should report Failed after the consumer vanished");
    }
}
