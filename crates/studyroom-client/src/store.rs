//! The canonical ordered message list for one room.
//!
//! The store is the single source of truth the renderer projects from. It
//! supports optimistic local inserts with later reconciliation against the
//! server-confirmed message, and wholesale replacement whenever the live
//! feed delivers a snapshot. Nothing else may reorder it.

use tracing::{debug, warn};

use studyroom_shared::{DeliveryStatus, Draft, Message, MessageId, UserId};

/// Ordered, de-duplicated in-memory message list.
///
/// Invariants:
/// - no two entries share a canonical id;
/// - timestamps are non-decreasing after any [`MessageStore::replace_all`];
/// - temp-id entries (optimistic sends not yet confirmed by a snapshot)
///   survive snapshot replacement at the tail.
#[derive(Debug, Default)]
pub struct MessageStore {
    messages: Vec<Message>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn get(&self, id: &MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| &m.id == id)
    }

    /// Insert a `Sending` entry for the viewer's own draft at the tail,
    /// before any network confirmation. Returns the temporary id used for
    /// later reconciliation.
    ///
    /// The caller renders immediately after this with force-scroll so the
    /// author always sees their own message.
    pub fn append_optimistic(&mut self, draft: &Draft, viewer: &UserId) -> MessageId {
        let id = MessageId::new_temp();
        self.messages.push(Message {
            id: id.clone(),
            author: viewer.clone(),
            text: draft.text.clone(),
            attachment: draft.attachment.clone(),
            timestamp: chrono::Utc::now(),
            status: DeliveryStatus::Sending,
            is_system: false,
        });
        debug!(id = %id, "optimistic insert");
        id
    }

    /// Replace the temporary entry with the server-confirmed message.
    ///
    /// The entry keeps its slot unless the canonical timestamp violates the
    /// ordering there, in which case it is moved to its sorted position.
    /// Returns `false` if `temp` is unknown (e.g. already swept by a
    /// snapshot that contained the canonical copy).
    pub fn reconcile(&mut self, temp: &MessageId, canonical: Message) -> bool {
        debug_assert!(temp.is_temp());
        let Some(index) = self.messages.iter().position(|m| &m.id == temp) else {
            debug!(temp = %temp, "reconcile target gone");
            return false;
        };

        // A snapshot may have already delivered the canonical copy; keeping
        // both would duplicate history, so the optimistic entry just goes.
        if self.messages.iter().any(|m| m.id == canonical.id) {
            warn!(id = %canonical.id, "canonical id already present, dropping optimistic entry");
            self.messages.remove(index);
            return true;
        }

        self.messages[index] = canonical;
        self.restore_order_around(index);
        true
    }

    /// Mark a `Sending` entry as failed. The UI exposes a retry affordance;
    /// retrying creates a brand-new attempt instead of resending this entry.
    pub fn mark_failed(&mut self, temp: &MessageId) -> bool {
        match self.messages.iter_mut().find(|m| &m.id == temp) {
            Some(message) if message.status == DeliveryStatus::Sending => {
                message.status = DeliveryStatus::Failed;
                true
            }
            Some(_) => false,
            None => false,
        }
    }

    /// Adopt a full ordered snapshot from the live feed.
    ///
    /// Canonical ids are de-duplicated (first occurrence wins), the result
    /// is stably sorted to non-decreasing timestamps, and optimistic
    /// entries still carrying a temp id are re-appended at the tail in
    /// their previous relative order.
    pub fn replace_all(&mut self, snapshot: Vec<Message>) {
        let mut seen = std::collections::HashSet::new();
        let mut next: Vec<Message> = snapshot
            .into_iter()
            .filter(|m| match m.id.as_canonical() {
                Some(id) => seen.insert(id.to_string()),
                // A feed must never deliver temp ids; drop any that appear.
                None => {
                    warn!(id = %m.id, "snapshot contained a temporary id, dropping");
                    false
                }
            })
            .collect();
        next.sort_by_key(|m| m.timestamp);

        let pending = self
            .messages
            .drain(..)
            .filter(|m| m.id.is_temp());
        next.extend(pending);

        self.messages = next;
    }

    /// Re-sort a single entry whose timestamp changed in place.
    fn restore_order_around(&mut self, index: usize) {
        let out_of_order = (index > 0
            && self.messages[index - 1].timestamp > self.messages[index].timestamp)
            || (index + 1 < self.messages.len()
                && self.messages[index].timestamp > self.messages[index + 1].timestamp);
        if !out_of_order {
            return;
        }

        let message = self.messages.remove(index);
        // Last slot whose timestamp is <= ours keeps equal-timestamp
        // neighbours in arrival order.
        let target = self
            .messages
            .partition_point(|m| m.timestamp <= message.timestamp);
        self.messages.insert(target, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{Duration, TimeZone, Utc};

    fn at(secs: i64) -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap() + Duration::seconds(secs)
    }

    fn canonical(id: &str, secs: i64) -> Message {
        Message::canonical(id, UserId::new("ana"), Some(id.to_string()), at(secs))
    }

    #[test]
    fn optimistic_insert_lands_at_the_tail_as_sending() {
        let mut store = MessageStore::new();
        store.replace_all(vec![canonical("m-1", 0)]);

        let temp = store.append_optimistic(&Draft::text("hello"), &UserId::new("me"));

        assert_eq!(store.len(), 2);
        let entry = store.get(&temp).unwrap();
        assert_eq!(entry.status, DeliveryStatus::Sending);
        assert!(entry.id.is_temp());
    }

    #[test]
    fn reconcile_replaces_in_the_same_slot() {
        let mut store = MessageStore::new();
        store.replace_all(vec![canonical("m-1", 0)]);
        let temp = store.append_optimistic(&Draft::text("hello"), &UserId::new("me"));

        assert!(store.reconcile(&temp, canonical("m-2", 5)));

        assert_eq!(store.len(), 2);
        assert_eq!(store.messages()[1].id, MessageId::canonical("m-2"));
        assert_eq!(store.messages()[1].status, DeliveryStatus::Sent);
        assert!(store.get(&temp).is_none());
    }

    #[test]
    fn reconcile_moves_the_entry_when_ordering_requires_it() {
        let mut store = MessageStore::new();
        store.replace_all(vec![canonical("m-1", 10), canonical("m-2", 20)]);
        let temp = store.append_optimistic(&Draft::text("hello"), &UserId::new("me"));

        // Canonical timestamp predates both existing messages.
        assert!(store.reconcile(&temp, canonical("m-0", 1)));

        let ids: Vec<String> = store
            .messages()
            .iter()
            .map(|m| m.id.to_string())
            .collect();
        assert_eq!(ids, vec!["m-0", "m-1", "m-2"]);
    }

    #[test]
    fn reconcile_refuses_an_existing_canonical_id() {
        let mut store = MessageStore::new();
        store.replace_all(vec![canonical("m-1", 0)]);
        let temp = store.append_optimistic(&Draft::text("hello"), &UserId::new("me"));

        // The snapshot already delivered m-1; the optimistic copy must go.
        assert!(store.reconcile(&temp, canonical("m-1", 0)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn mark_failed_transitions_exactly_once() {
        let mut store = MessageStore::new();
        let temp = store.append_optimistic(&Draft::text("hello"), &UserId::new("me"));

        assert!(store.mark_failed(&temp));
        assert_eq!(store.get(&temp).unwrap().status, DeliveryStatus::Failed);
        // Already failed: no second transition.
        assert!(!store.mark_failed(&temp));
    }

    #[test]
    fn replace_all_dedups_and_sorts() {
        let mut store = MessageStore::new();
        store.replace_all(vec![
            canonical("m-2", 20),
            canonical("m-1", 10),
            canonical("m-2", 99), // duplicate id, first occurrence wins
            canonical("m-3", 15),
        ]);

        let ids: Vec<String> = store
            .messages()
            .iter()
            .map(|m| m.id.to_string())
            .collect();
        assert_eq!(ids, vec!["m-1", "m-3", "m-2"]);

        let timestamps: Vec<_> = store.messages().iter().map(|m| m.timestamp).collect();
        let mut sorted = timestamps.clone();
        sorted.sort();
        assert_eq!(timestamps, sorted);
    }

    #[test]
    fn replace_all_preserves_unconfirmed_temps_at_the_tail() {
        let mut store = MessageStore::new();
        let temp_a = store.append_optimistic(&Draft::text("a"), &UserId::new("me"));
        let temp_b = store.append_optimistic(&Draft::text("b"), &UserId::new("me"));

        store.replace_all(vec![canonical("m-1", 0)]);

        assert_eq!(store.len(), 3);
        assert_eq!(store.messages()[1].id, temp_a);
        assert_eq!(store.messages()[2].id, temp_b);
    }

    #[test]
    fn replace_all_sweeps_confirmed_entries() {
        let mut store = MessageStore::new();
        let temp = store.append_optimistic(&Draft::text("a"), &UserId::new("me"));
        assert!(store.reconcile(&temp, canonical("m-9", 5)));

        // The server snapshot now carries m-9 itself; no duplicate appears.
        store.replace_all(vec![canonical("m-1", 0), canonical("m-9", 5)]);
        assert_eq!(store.len(), 2);
    }
}
