//! Trait surface of the services this subsystem consumes.
//!
//! The live feed keeps its push-callback shape: the backend delivers full
//! ordered snapshots (or errors) into a channel the subscriber owns, and the
//! returned [`FeedSubscription`] guard releases the listener on drop so a
//! closed room view can never leak a subscription.

use std::collections::HashMap;

use async_trait::async_trait;
use futures::future::join_all;
use tokio::sync::mpsc;

use studyroom_shared::{AuthorProfile, Draft, FeedError, Message, ProfileError, RoomId, SendError, UserId};

/// One delivery from the live feed.
#[derive(Debug, Clone)]
pub enum FeedEvent {
    /// A full ordered snapshot of the room's current messages.
    Snapshot(Vec<Message>),
    /// The subscription broke; the subscriber will back off and resubscribe.
    Error(FeedError),
}

/// Guard for one live subscription.
///
/// Dropping the guard (or calling [`FeedSubscription::cancel`]) releases the
/// underlying listener. Cancellation is idempotent.
pub struct FeedSubscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl FeedSubscription {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// A subscription that needs no teardown.
    pub fn noop() -> Self {
        Self { cancel: None }
    }

    /// Release the listener now instead of at drop time.
    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for FeedSubscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for FeedSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedSubscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

/// The live message feed for a room.
pub trait MessageFeed: Send + Sync {
    /// Open a subscription delivering [`FeedEvent`]s into `events`.
    ///
    /// Deliveries after the returned guard is dropped must be discarded by
    /// the implementation (the channel receiver may already be gone).
    fn subscribe(&self, room: &RoomId, events: mpsc::Sender<FeedEvent>) -> FeedSubscription;
}

/// Message submission.
#[async_trait]
pub trait MessageSender: Send + Sync {
    /// Submit a validated draft, returning the canonical message on success.
    ///
    /// Transport and validation failures must be distinguishable; the caller
    /// never auto-retries either kind.
    async fn send(&self, room: &RoomId, draft: &Draft) -> Result<Message, SendError>;
}

/// Author profile lookup.
#[async_trait]
pub trait ProfileService: Send + Sync {
    async fn fetch_profile(&self, author: &UserId) -> Result<AuthorProfile, ProfileError>;

    /// Fetch several profiles at once.
    ///
    /// Authors without a record are simply omitted from the result; the
    /// enrichment cache substitutes deterministic fallbacks. The default
    /// implementation fans out over [`fetch_profile`] concurrently, so even
    /// services without a native batch endpoint never degrade to sequential
    /// per-id lookups.
    ///
    /// [`fetch_profile`]: ProfileService::fetch_profile
    async fn fetch_profiles(
        &self,
        authors: &[UserId],
    ) -> Result<HashMap<UserId, AuthorProfile>, ProfileError> {
        let lookups = authors.iter().map(|author| self.fetch_profile(author));
        let results = join_all(lookups).await;

        let mut profiles = HashMap::new();
        for (author, result) in authors.iter().zip(results) {
            match result {
                Ok(profile) => {
                    profiles.insert(author.clone(), profile);
                }
                Err(ProfileError::NotFound) => {}
                Err(e) => {
                    tracing::warn!(author = %author, error = %e, "profile lookup failed in batch");
                }
            }
        }
        Ok(profiles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct OneByOne {
        calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl ProfileService for OneByOne {
        async fn fetch_profile(&self, author: &UserId) -> Result<AuthorProfile, ProfileError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if author.0 == "missing" {
                return Err(ProfileError::NotFound);
            }
            Ok(AuthorProfile::new(author.0.to_uppercase(), None))
        }
    }

    #[tokio::test]
    async fn default_batch_fans_out_and_skips_not_found() {
        let calls = Arc::new(AtomicU32::new(0));
        let service = OneByOne {
            calls: calls.clone(),
        };

        let authors = vec![UserId::new("ana"), UserId::new("missing"), UserId::new("bo")];
        let profiles = service.fetch_profiles(&authors).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(profiles.len(), 2);
        assert_eq!(profiles[&UserId::new("ana")].display_name, "ANA");
        assert!(!profiles.contains_key(&UserId::new("missing")));
    }

    #[test]
    fn subscription_guard_cancels_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();

        let sub = FeedSubscription::new(move || {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });
        sub.cancel();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let calls_clone = calls.clone();
        drop(FeedSubscription::new(move || {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
