//! The author enrichment cache.
//!
//! Lookup order: in-memory map, session special cases (the viewer, the
//! system sentinel), the persisted SQLite layer, then the remote profile
//! service. Every outcome is cached -- including the deterministic fallback
//! after a failed or empty lookup -- so a flaky backend cannot cause
//! repeated lookups for the same author within the TTL window.
//!
//! Both layers judge freshness by wall-clock fetch time, so they agree on
//! expiry across process restarts.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use studyroom_feed::ProfileService;
use studyroom_shared::constants::{PROFILE_CACHE_CAP, PROFILE_TTL_SECS};
use studyroom_shared::{AuthorProfile, DisplayEntry, ProfileError, UserId};
use studyroom_store::Database;

use crate::session::SessionIdentity;

/// Memoized, TTL-bounded resolver of author display metadata.
///
/// Shared across the room view's tasks behind an `Arc`; the in-memory map
/// uses a plain mutex and is never held across an await point.
pub struct AuthorCache {
    memory: Mutex<HashMap<UserId, DisplayEntry>>,
    persisted: Option<Arc<Mutex<Database>>>,
    service: Arc<dyn ProfileService>,
    viewer: SessionIdentity,
    ttl: Duration,
}

impl AuthorCache {
    pub fn new(
        service: Arc<dyn ProfileService>,
        persisted: Option<Arc<Mutex<Database>>>,
        viewer: SessionIdentity,
    ) -> Self {
        let cache = Self {
            memory: Mutex::new(HashMap::new()),
            persisted,
            service,
            viewer,
            ttl: Duration::seconds(PROFILE_TTL_SECS as i64),
        };
        // The viewer's own profile comes from session state, never remote.
        cache.store(
            cache.viewer.user_id.clone(),
            DisplayEntry::new(cache.viewer.profile.clone(), Utc::now()),
        );
        cache.sweep_persisted();
        cache
    }

    /// A cached, non-expired profile, or `None` on miss or expiry.
    ///
    /// Consults the in-memory layer only; resolving through the persisted
    /// or remote layers is [`AuthorCache::resolve`]'s job.
    pub fn get(&self, author: &UserId) -> Option<AuthorProfile> {
        let Ok(memory) = self.memory.lock() else {
            return None;
        };
        memory
            .get(author)
            .filter(|entry| !entry.is_expired(Utc::now(), self.ttl))
            .map(|entry| entry.profile.clone())
    }

    /// Resolve one author, never failing: remote errors and missing records
    /// degrade to the deterministic fallback, which is cached like any
    /// other outcome.
    pub async fn resolve(&self, author: &UserId) -> AuthorProfile {
        let now = Utc::now();
        if let Some(profile) = self.lookup_local(author, now) {
            return profile;
        }

        let profile = match self.service.fetch_profile(author).await {
            Ok(profile) => profile,
            Err(ProfileError::NotFound) => AuthorProfile::fallback(author),
            Err(e) => {
                warn!(author = %author, error = %e, "profile lookup failed, using fallback");
                AuthorProfile::fallback(author)
            }
        };
        self.store(author.clone(), DisplayEntry::new(profile.clone(), now));
        profile
    }

    /// Resolve a set of authors with at most one remote round trip.
    ///
    /// Input is de-duplicated; locally answerable ids never reach the
    /// service. Ids the batch response omits (or the whole batch failing)
    /// get the fallback, cached like a real result.
    pub async fn resolve_batch(&self, authors: &[UserId]) -> HashMap<UserId, AuthorProfile> {
        let now = Utc::now();
        let mut resolved = HashMap::new();
        let mut missing = Vec::new();
        let mut seen = HashSet::new();

        for author in authors {
            if !seen.insert(author.clone()) {
                continue;
            }
            match self.lookup_local(author, now) {
                Some(profile) => {
                    resolved.insert(author.clone(), profile);
                }
                None => missing.push(author.clone()),
            }
        }

        if missing.is_empty() {
            return resolved;
        }
        debug!(count = missing.len(), "batch profile fetch");

        let fetched = match self.service.fetch_profiles(&missing).await {
            Ok(map) => map,
            Err(e) => {
                warn!(error = %e, count = missing.len(), "batch profile lookup failed");
                HashMap::new()
            }
        };

        for author in missing {
            let profile = fetched
                .get(&author)
                .cloned()
                .unwrap_or_else(|| AuthorProfile::fallback(&author));
            self.store(author.clone(), DisplayEntry::new(profile.clone(), now));
            resolved.insert(author, profile);
        }
        resolved
    }

    /// Answer from session state or either cache layer, without touching
    /// the network.
    fn lookup_local(&self, author: &UserId, now: DateTime<Utc>) -> Option<AuthorProfile> {
        if let Ok(memory) = self.memory.lock() {
            if let Some(entry) = memory.get(author) {
                if !entry.is_expired(now, self.ttl) {
                    return Some(entry.profile.clone());
                }
            }
        }

        if author == &self.viewer.user_id {
            let entry = DisplayEntry::new(self.viewer.profile.clone(), now);
            self.store(author.clone(), entry);
            return Some(self.viewer.profile.clone());
        }
        if author.is_system() {
            return Some(AuthorProfile::system());
        }

        // Persisted layer, same wall-clock TTL.
        if let Some(db) = &self.persisted {
            if let Ok(db) = db.lock() {
                match db.get_fresh_profile(author, now, self.ttl) {
                    Ok(Some(entry)) => {
                        let profile = entry.profile.clone();
                        if let Ok(mut memory) = self.memory.lock() {
                            memory.insert(author.clone(), entry);
                        }
                        return Some(profile);
                    }
                    Ok(None) => {}
                    Err(e) => warn!(author = %author, error = %e, "persisted cache read failed"),
                }
            }
        }

        None
    }

    /// Write one entry through both layers. Last write wins per author id.
    fn store(&self, author: UserId, entry: DisplayEntry) {
        if let Some(db) = &self.persisted {
            if let Ok(db) = db.lock() {
                if let Err(e) = db.upsert_profile(&author, &entry) {
                    warn!(author = %author, error = %e, "persisted cache write failed");
                } else if let Err(e) = db.enforce_profile_cap(PROFILE_CACHE_CAP) {
                    warn!(error = %e, "profile cap enforcement failed");
                }
            }
        }
        if let Ok(mut memory) = self.memory.lock() {
            memory.insert(author, entry);
        }
    }

    /// Drop expired rows from the persisted layer. Called once per session.
    fn sweep_persisted(&self) {
        let Some(db) = &self.persisted else { return };
        let Ok(db) = db.lock() else { return };
        match db.prune_expired(Utc::now(), self.ttl) {
            Ok(0) => {}
            Ok(n) => debug!(removed = n, "pruned expired persisted profiles"),
            Err(e) => warn!(error = %e, "persisted cache prune failed"),
        }
    }

    /// Backdate an entry's fetch time (tests).
    #[cfg(test)]
    fn age_entry(&self, author: &UserId, by: Duration) {
        let mut memory = self.memory.lock().unwrap();
        if let Some(entry) = memory.get_mut(author) {
            entry.fetched_at -= by;
        }
    }
}
