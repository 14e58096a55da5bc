use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::{FALLBACK_NAME_CHARS, SYSTEM_USER_ID, TEMP_ID_PREFIX};

/// Identifier of one study room.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct RoomId(pub Uuid);

impl RoomId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RoomId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RoomId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque identifier of a principal (a student, or the system sentinel).
///
/// The backend assigns these; the client never interprets them beyond
/// equality, the system sentinel, and the short form used as a display
/// fallback.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The reserved author id for room announcements.
    pub fn system() -> Self {
        Self(SYSTEM_USER_ID.to_string())
    }

    pub fn is_system(&self) -> bool {
        self.0 == SYSTEM_USER_ID
    }

    /// First characters of the id, used as the fallback display name when
    /// no profile can be resolved.
    pub fn short(&self) -> String {
        self.0.chars().take(FALLBACK_NAME_CHARS).collect()
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Identifier of a message.
///
/// A message starts life with a client-generated [`MessageId::Temp`] while
/// the send is in flight and is reconciled to the server-assigned
/// [`MessageId::Canonical`] once confirmed. Keeping the two as distinct
/// variants (rather than a prefix convention on a single string) makes it
/// impossible for reconciliation to mistake one for the other.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageId {
    /// Client-generated, pre-confirmation.
    Temp(Uuid),
    /// Server-assigned, stable for the lifetime of the room.
    Canonical(String),
}

impl MessageId {
    /// Mint a fresh temporary id for an optimistic send.
    pub fn new_temp() -> Self {
        Self::Temp(Uuid::new_v4())
    }

    pub fn canonical(id: impl Into<String>) -> Self {
        Self::Canonical(id.into())
    }

    pub fn is_temp(&self) -> bool {
        matches!(self, Self::Temp(_))
    }

    /// The canonical id string, if this id has been confirmed.
    pub fn as_canonical(&self) -> Option<&str> {
        match self {
            Self::Canonical(id) => Some(id),
            Self::Temp(_) => None,
        }
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Temp(uuid) => write!(f, "{TEMP_ID_PREFIX}{uuid}"),
            Self::Canonical(id) => write!(f, "{id}"),
        }
    }
}

// Serialized as the prefixed string form so the id survives a round trip
// through JSON (event payloads to an embedding UI) without losing the
// temp/canonical distinction.
impl Serialize for MessageId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for MessageId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        match s.strip_prefix(TEMP_ID_PREFIX) {
            Some(rest) => {
                let uuid = Uuid::parse_str(rest).map_err(serde::de::Error::custom)?;
                Ok(Self::Temp(uuid))
            }
            None => Ok(Self::Canonical(s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_and_canonical_never_compare_equal() {
        let temp = MessageId::new_temp();
        let canonical = MessageId::canonical(temp.to_string());
        assert_ne!(temp, canonical);
    }

    #[test]
    fn temp_display_is_prefixed() {
        let temp = MessageId::new_temp();
        assert!(temp.to_string().starts_with(TEMP_ID_PREFIX));
        assert!(MessageId::canonical("m-42").to_string().starts_with("m-"));
    }

    #[test]
    fn message_id_serde_round_trip() {
        let temp = MessageId::new_temp();
        let json = serde_json::to_string(&temp).unwrap();
        let back: MessageId = serde_json::from_str(&json).unwrap();
        assert_eq!(temp, back);

        let canonical = MessageId::canonical("abc123");
        let json = serde_json::to_string(&canonical).unwrap();
        let back: MessageId = serde_json::from_str(&json).unwrap();
        assert_eq!(canonical, back);
    }

    #[test]
    fn short_takes_first_eight_chars() {
        let id = UserId::new("abcdefghij");
        assert_eq!(id.short(), "abcdefgh");
        let tiny = UserId::new("ab");
        assert_eq!(tiny.short(), "ab");
    }

    #[test]
    fn system_sentinel() {
        assert!(UserId::system().is_system());
        assert!(!UserId::new("alice").is_system());
    }
}
