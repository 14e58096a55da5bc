//! # studyroom-shared
//!
//! Domain types shared across the studyroom workspace: room, user and
//! message identifiers, the message and draft models, author display
//! metadata, the error taxonomy, and protocol constants.
//!
//! The crate is free of I/O and async code so every other crate can depend
//! on it without pulling in a runtime.

pub mod constants;
pub mod message;
pub mod profile;
pub mod types;

mod error;

pub use error::{FeedError, ProfileError, SendError, ValidationError};
pub use message::{Attachment, AttachmentKind, DeliveryStatus, Draft, Message};
pub use profile::{AuthorProfile, DisplayEntry};
pub use types::{MessageId, RoomId, UserId};
