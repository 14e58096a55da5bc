//! Author display metadata and its cache-entry wrapper.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{FALLBACK_AVATAR_INITIAL, SYSTEM_DISPLAY_NAME};
use crate::types::UserId;

/// Display metadata for one author.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthorProfile {
    pub display_name: String,
    /// Single character shown in the avatar circle when no photo is set.
    pub avatar_initial: String,
    pub photo_url: Option<String>,
}

impl AuthorProfile {
    pub fn new(display_name: impl Into<String>, photo_url: Option<String>) -> Self {
        let display_name = display_name.into();
        let avatar_initial = display_name
            .chars()
            .next()
            .map(|c| c.to_uppercase().to_string())
            .unwrap_or_else(|| FALLBACK_AVATAR_INITIAL.to_string());
        Self {
            display_name,
            avatar_initial,
            photo_url,
        }
    }

    /// Deterministic stand-in when no profile record can be fetched: the
    /// first characters of the id and a generic initial.
    pub fn fallback(author: &UserId) -> Self {
        Self {
            display_name: author.short(),
            avatar_initial: FALLBACK_AVATAR_INITIAL.to_string(),
            photo_url: None,
        }
    }

    /// The fixed label used for room announcements.
    pub fn system() -> Self {
        Self {
            display_name: SYSTEM_DISPLAY_NAME.to_string(),
            avatar_initial: FALLBACK_AVATAR_INITIAL.to_string(),
            photo_url: None,
        }
    }
}

/// A cached profile together with the wall-clock instant it was fetched.
///
/// Expiry is judged against wall-clock time rather than a relative counter
/// so the persisted cache layer agrees with the in-memory one across page
/// reloads and process restarts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DisplayEntry {
    pub profile: AuthorProfile,
    pub fetched_at: DateTime<Utc>,
}

impl DisplayEntry {
    pub fn new(profile: AuthorProfile, fetched_at: DateTime<Utc>) -> Self {
        Self {
            profile,
            fetched_at,
        }
    }

    /// Whether the entry is older than `ttl` as of `now`.
    ///
    /// An expired entry must be treated as absent; callers that want
    /// best-effort stale data have to ask for it explicitly.
    pub fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now - self.fetched_at > ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_uses_short_id_and_generic_initial() {
        let profile = AuthorProfile::fallback(&UserId::new("a1b2c3d4e5f6"));
        assert_eq!(profile.display_name, "a1b2c3d4");
        assert_eq!(profile.avatar_initial, "U");
        assert!(profile.photo_url.is_none());
    }

    #[test]
    fn initial_derived_from_display_name() {
        let profile = AuthorProfile::new("maria", None);
        assert_eq!(profile.avatar_initial, "M");
        let empty = AuthorProfile::new("", None);
        assert_eq!(empty.avatar_initial, "U");
    }

    #[test]
    fn expiry_is_exclusive_at_the_boundary() {
        let ttl = Duration::minutes(5);
        let fetched = Utc::now();
        let entry = DisplayEntry::new(AuthorProfile::new("ana", None), fetched);

        // Exactly at the TTL the entry is still fresh; one ms past, it is not.
        assert!(!entry.is_expired(fetched + ttl, ttl));
        assert!(entry.is_expired(fetched + ttl + Duration::milliseconds(1), ttl));
        assert!(!entry.is_expired(fetched + Duration::seconds(299), ttl));
    }
}
