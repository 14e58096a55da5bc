/// Reserved author id for room announcements (joins, renames, ...).
pub const SYSTEM_USER_ID: &str = "system";

/// Fixed display label for system announcements.
pub const SYSTEM_DISPLAY_NAME: &str = "StudyRoom";

/// Prefix that namespaces client-generated temporary message ids so they
/// can never collide with server-assigned ones.
pub const TEMP_ID_PREFIX: &str = "tmp-";

/// Author profile time-to-live, in seconds. Applies to both the in-memory
/// and the persisted cache layer.
pub const PROFILE_TTL_SECS: u64 = 300;

/// Upper bound on rows kept in the persisted profile cache.
pub const PROFILE_CACHE_CAP: usize = 512;

/// Delay before the first resubscription attempt, in milliseconds.
pub const BACKOFF_BASE_MS: u64 = 1_000;

/// Ceiling on the resubscription delay, in milliseconds.
pub const BACKOFF_CEILING_MS: u64 = 30_000;

/// How long a subscription attempt may stay silent before it is treated as
/// a transport failure, in seconds.
pub const CONNECT_WATCHDOG_SECS: u64 = 20;

/// Gap above which two same-author messages stop being visually grouped,
/// in seconds.
pub const GROUPING_THRESHOLD_SECS: i64 = 300;

/// Distance from the bottom (in pixels) within which a re-render keeps the
/// view pinned to the newest message.
pub const NEAR_BOTTOM_PX: f64 = 120.0;

/// Messages prefetched beyond each end of the visible range.
pub const PREFETCH_MARGIN: usize = 8;

/// Debounce window for viewport-driven enrichment, in milliseconds.
pub const ENRICH_DEBOUNCE_MS: u64 = 150;

/// Rows enriched from the top of the transcript when the viewport cannot
/// be measured.
pub const ENRICH_FALLBACK_ROWS: usize = 20;

/// Placeholder avatar initial for authors without a resolved profile.
pub const FALLBACK_AVATAR_INITIAL: &str = "U";

/// Characters of the author id used as the fallback display name.
pub const FALLBACK_NAME_CHARS: usize = 8;

/// Maximum attachment size accepted by [`Draft::validate`] (25 MiB).
///
/// [`Draft::validate`]: crate::message::Draft::validate
pub const MAX_ATTACHMENT_BYTES: u64 = 25 * 1024 * 1024;

/// Maximum message text length, in characters.
pub const MAX_TEXT_CHARS: usize = 4_000;
