//! Viewport-aware, debounced author enrichment.
//!
//! Enriching every author in a long history eagerly would waste lookups on
//! rows nobody is looking at, so the enricher resolves only the authors of
//! currently visible rows (plus a prefetch margin on both sides) and emits
//! in-place patches instead of forcing a re-render.
//!
//! Debouncing uses a generation counter: every `schedule` call bumps the
//! generation and spawns a task that sleeps out the debounce window, then
//! proceeds only if no newer call has superseded it. A batch that already
//! started resolving is allowed to finish.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;

use studyroom_shared::constants::{ENRICH_DEBOUNCE_MS, ENRICH_FALLBACK_ROWS, PREFETCH_MARGIN};
use studyroom_shared::{AuthorProfile, MessageId, UserId};

use crate::cache::AuthorCache;

/// How the embedding UI reports which rendered message rows are on screen.
///
/// Indices refer to message rows in transcript order (date headers don't
/// count). `None` means the layout is currently unmeasurable.
pub trait ViewportProbe: Send + Sync {
    fn visible_range(&self) -> Option<(usize, usize)>;
}

/// An in-place update for one rendered row: patch the author name/avatar
/// without a full re-render.
#[derive(Debug, Clone, Serialize)]
pub struct AuthorPatch {
    pub message_id: MessageId,
    pub profile: AuthorProfile,
}

/// The enrichment-relevant slice of one rendered row.
#[derive(Debug, Clone)]
pub struct EnrichRow {
    pub message_id: MessageId,
    pub author: UserId,
    pub is_system: bool,
}

/// Enricher tuning knobs.
#[derive(Debug, Clone)]
pub struct EnrichConfig {
    /// Debounce window for scroll/render driven scheduling.
    pub debounce: Duration,
    /// Rows prefetched beyond each end of the visible range.
    pub prefetch_margin: usize,
    /// Rows enriched from the top when the viewport is unmeasurable.
    pub fallback_rows: usize,
}

impl Default for EnrichConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(ENRICH_DEBOUNCE_MS),
            prefetch_margin: PREFETCH_MARGIN,
            fallback_rows: ENRICH_FALLBACK_ROWS,
        }
    }
}

/// Debounced scheduler bounding enrichment to the visible range.
#[derive(Clone)]
pub struct VisibleRangeEnricher {
    cache: Arc<AuthorCache>,
    probe: Arc<dyn ViewportProbe>,
    patch_tx: mpsc::Sender<Vec<AuthorPatch>>,
    generation: Arc<AtomicU64>,
    config: EnrichConfig,
}

impl VisibleRangeEnricher {
    pub fn new(
        cache: Arc<AuthorCache>,
        probe: Arc<dyn ViewportProbe>,
        patch_tx: mpsc::Sender<Vec<AuthorPatch>>,
        config: EnrichConfig,
    ) -> Self {
        Self {
            cache,
            probe,
            patch_tx,
            generation: Arc::new(AtomicU64::new(0)),
            config,
        }
    }

    /// Schedule an enrichment pass over the current transcript rows.
    ///
    /// Called on every render and (debounced) on every scroll. A newer call
    /// during the debounce window replaces this one.
    pub fn schedule(&self, rows: Vec<EnrichRow>) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let this = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(this.config.debounce).await;
            if this.generation.load(Ordering::SeqCst) != generation {
                return; // superseded
            }
            this.enrich(rows).await;
        });
    }

    async fn enrich(&self, rows: Vec<EnrichRow>) {
        if rows.is_empty() {
            return;
        }
        let last = rows.len() - 1;

        let (start, end) = match self.probe.visible_range() {
            Some((s, e)) => {
                let start = s.min(last);
                (start, e.clamp(start, last))
            }
            // Layout thrash: enrich the head of the list instead of nothing.
            None => (0, self.config.fallback_rows.saturating_sub(1).min(last)),
        };

        // Authors of visible rows without a fresh cache entry, one batch.
        let stale = stale_authors(&rows[start..=end], &self.cache);
        if !stale.is_empty() {
            let profiles = self.cache.resolve_batch(&stale).await;
            let patches: Vec<AuthorPatch> = rows[start..=end]
                .iter()
                .filter_map(|row| {
                    profiles.get(&row.author).map(|profile| AuthorPatch {
                        message_id: row.message_id.clone(),
                        profile: profile.clone(),
                    })
                })
                .collect();
            if !patches.is_empty() {
                debug!(count = patches.len(), "patching visible rows");
                let _ = self.patch_tx.send(patches).await;
            }
        }

        // Best-effort prefetch for the margin: warms the cache for a future
        // render, emits no patches, swallows failures.
        let margin = self.config.prefetch_margin;
        let before = &rows[start.saturating_sub(margin)..start];
        let after = &rows[(end + 1).min(rows.len())..(end + 1 + margin).min(rows.len())];
        let warm: Vec<UserId> = stale_authors(before, &self.cache)
            .into_iter()
            .chain(stale_authors(after, &self.cache))
            .collect();
        if !warm.is_empty() {
            let _ = self.cache.resolve_batch(&warm).await;
        }
    }
}

/// Unique non-system authors in `rows` lacking a fresh cache entry.
fn stale_authors(rows: &[EnrichRow], cache: &AuthorCache) -> Vec<UserId> {
    let mut seen = std::collections::HashSet::new();
    rows.iter()
        .filter(|row| !row.is_system)
        .filter(|row| seen.insert(row.author.clone()))
        .filter(|row| cache.get(&row.author).is_none())
        .map(|row| row.author.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;
    use std::sync::atomic::AtomicU32;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use studyroom_feed::ProfileService;
    use studyroom_shared::ProfileError;

    use crate::session::SessionIdentity;

    struct RecordingService {
        batch_calls: AtomicU32,
        requested: Mutex<Vec<Vec<UserId>>>,
    }

    impl RecordingService {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                batch_calls: AtomicU32::new(0),
                requested: Mutex::new(Vec::new()),
            })
        }

        fn all_requested(&self) -> Vec<UserId> {
            self.requested.lock().unwrap().concat()
        }
    }

    #[async_trait]
    impl ProfileService for RecordingService {
        async fn fetch_profile(&self, author: &UserId) -> Result<AuthorProfile, ProfileError> {
            Ok(AuthorProfile::new(author.0.to_uppercase(), None))
        }

        async fn fetch_profiles(
            &self,
            authors: &[UserId],
        ) -> Result<HashMap<UserId, AuthorProfile>, ProfileError> {
            self.batch_calls.fetch_add(1, Ordering::SeqCst);
            self.requested.lock().unwrap().push(authors.to_vec());
            Ok(authors
                .iter()
                .map(|a| (a.clone(), AuthorProfile::new(a.0.to_uppercase(), None)))
                .collect())
        }
    }

    struct FixedProbe(Option<(usize, usize)>);

    impl ViewportProbe for FixedProbe {
        fn visible_range(&self) -> Option<(usize, usize)> {
            self.0
        }
    }

    fn rows(n: usize) -> Vec<EnrichRow> {
        (0..n)
            .map(|i| EnrichRow {
                message_id: MessageId::canonical(format!("m-{i}")),
                author: UserId::new(format!("author-{i}")),
                is_system: false,
            })
            .collect()
    }

    fn enricher(
        service: Arc<RecordingService>,
        probe: Option<(usize, usize)>,
        margin: usize,
    ) -> (VisibleRangeEnricher, mpsc::Receiver<Vec<AuthorPatch>>) {
        let cache = Arc::new(AuthorCache::new(
            service,
            None,
            SessionIdentity {
                user_id: UserId::new("me"),
                profile: AuthorProfile::new("Me", None),
            },
        ));
        let (patch_tx, patch_rx) = mpsc::channel(8);
        let config = EnrichConfig {
            debounce: Duration::from_millis(10),
            prefetch_margin: margin,
            fallback_rows: 4,
        };
        (
            VisibleRangeEnricher::new(cache, Arc::new(FixedProbe(probe)), patch_tx, config),
            patch_rx,
        )
    }

    #[tokio::test]
    async fn patches_visible_rows_in_one_batch() {
        let service = RecordingService::new();
        let (enricher, mut patch_rx) = enricher(service.clone(), Some((1, 3)), 0);

        enricher.schedule(rows(6));

        let patches = patch_rx.recv().await.expect("patches");
        let ids: Vec<String> = patches.iter().map(|p| p.message_id.to_string()).collect();
        assert_eq!(ids, vec!["m-1", "m-2", "m-3"]);
        assert_eq!(patches[0].profile.display_name, "AUTHOR-1");
        assert_eq!(service.batch_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn a_newer_schedule_supersedes_the_pending_one() {
        let service = RecordingService::new();
        let (enricher, mut patch_rx) = enricher(service.clone(), Some((0, 1)), 0);

        enricher.schedule(rows(2));
        // Rescheduled within the debounce window: only the second runs.
        enricher.schedule(rows(2));

        let _ = patch_rx.recv().await.expect("patches");
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(service.batch_calls.load(Ordering::SeqCst), 1);
        assert!(patch_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn unmeasurable_viewport_enriches_the_head() {
        let service = RecordingService::new();
        let (enricher, mut patch_rx) = enricher(service.clone(), None, 0);

        enricher.schedule(rows(10));

        let patches = patch_rx.recv().await.expect("patches");
        // fallback_rows = 4 in the test config.
        assert_eq!(patches.len(), 4);
        assert_eq!(patches[0].message_id.to_string(), "m-0");
    }

    #[tokio::test]
    async fn margin_rows_are_warmed_without_patches() {
        let service = RecordingService::new();
        let (enricher, mut patch_rx) = enricher(service.clone(), Some((4, 5)), 2);

        enricher.schedule(rows(12));

        let patches = patch_rx.recv().await.expect("patches");
        assert_eq!(patches.len(), 2); // rows 4..=5 only

        // Wait for the prefetch batch, then check what was requested.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let requested = service.all_requested();
        let names: std::collections::HashSet<String> =
            requested.iter().map(|u| u.0.clone()).collect();
        // Visible 4..=5 plus margin 2..4 and 6..8.
        for i in 2..8 {
            assert!(names.contains(&format!("author-{i}")), "author-{i} missing");
        }
        assert!(!names.contains("author-0"));
        assert!(!names.contains("author-9"));
        assert!(patch_rx.try_recv().is_err(), "prefetch must not patch");
    }

    #[tokio::test]
    async fn system_rows_and_fresh_authors_are_skipped() {
        let service = RecordingService::new();
        let (enricher, mut patch_rx) = enricher(service.clone(), Some((0, 2)), 0);

        let mut rows = rows(3);
        rows[1].author = UserId::system();
        rows[1].is_system = true;

        enricher.schedule(rows);

        let patches = patch_rx.recv().await.expect("patches");
        let ids: Vec<String> = patches.iter().map(|p| p.message_id.to_string()).collect();
        assert_eq!(ids, vec!["m-0", "m-2"]);
    }
}
