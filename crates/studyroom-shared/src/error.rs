use thiserror::Error;

/// A send attempt violated a local precondition.
///
/// Never retried automatically; surfaced to the caller synchronously and
/// never mutates the message store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Message is empty")]
    Empty,

    #[error("Message text is too long ({chars} chars, max {max})")]
    TextTooLong { chars: usize, max: usize },

    #[error("Attachment is too large ({size} bytes, max {max})")]
    AttachmentTooLarge { size: u64, max: u64 },

    /// The backend rejected the message after it passed the local checks.
    #[error("Rejected by the backend: {0}")]
    Rejected(String),
}

/// Failure of a message send attempt.
#[derive(Error, Debug)]
pub enum SendError {
    /// Connectivity failure. The optimistic entry is marked failed and the
    /// viewer may retry manually; automatic resends are never issued.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The backend rejected the message.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

/// Failure of the live message feed.
///
/// Both variants are retryable: the subscriber handles them internally with
/// exponential backoff and the UI only ever sees a transient notice.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FeedError {
    #[error("Transport error: {0}")]
    Transport(String),

    /// A subscription attempt stayed silent past the connect watchdog.
    /// Treated exactly like a transport failure.
    #[error("Subscription attempt timed out after {0}s")]
    Timeout(u64),
}

/// Failure of an author profile lookup.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProfileError {
    /// No record for this author. A normal fallback path, never surfaced
    /// to the viewer.
    #[error("No profile record for author")]
    NotFound,

    #[error("Transport error: {0}")]
    Transport(String),
}
