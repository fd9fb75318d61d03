//! Message sequence container and the deduplication/ordering policy
//!
//! Sockets can redeliver frames after reconnects, and optimistic sends race
//! with their own server echo. The transport offers no idempotency keys, so
//! every insertion is filtered through a near-duplicate signature: same
//! direction, same trimmed content, same sender/receiver pair, timestamps
//! within a bounded window. The policy makes the final thread state
//! order-independent of how socket frames and REST pages interleave.

use crate::storage::message::Message;
use serde::{Deserialize, Serialize};

/// Deduplication policy applied on every insertion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DedupPolicy {
    /// Near-duplicate timestamp tolerance in milliseconds
    pub window_ms: i64,
}

impl Default for DedupPolicy {
    fn default() -> Self {
        Self { window_ms: 5_000 }
    }
}

/// Outcome of an insertion attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The message was appended
    Inserted,
    /// Rejected: the server id is already present
    DuplicateId,
    /// Rejected: a near-duplicate already exists
    NearDuplicate,
}

/// The active conversation's message sequence
///
/// Append-mostly: accepted items are only ever mutated by
/// confirmation/replacement or by the failed-send marker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageThread {
    /// Messages sorted ascending by timestamp
    pub messages: Vec<Message>,
}

impl MessageThread {
    /// Create an empty thread
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of messages in the thread
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the thread holds no messages
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// The newest message, if any
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Look up a message by id
    pub fn get(&self, id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    /// Mutable lookup by id
    pub fn get_mut(&mut self, id: &str) -> Option<&mut Message> {
        self.messages.iter_mut().find(|m| m.id == id)
    }

    /// Insert a message, applying the deduplication policy
    ///
    /// 1. An incoming server id already present in the thread is rejected.
    /// 2. A near-duplicate of an existing *non-pending* item is rejected.
    ///    Pending items are excluded as candidates: they are replacement
    ///    targets for the send pipeline, not duplicate sources.
    /// 3. Otherwise the message is appended and the thread re-sorted.
    pub fn insert(&mut self, message: Message, policy: DedupPolicy) -> InsertOutcome {
        if !message.has_temp_id() && self.messages.iter().any(|m| m.id == message.id) {
            return InsertOutcome::DuplicateId;
        }
        if self
            .messages
            .iter()
            .any(|m| !m.is_pending() && same_signature(m, &message, policy.window_ms))
        {
            return InsertOutcome::NearDuplicate;
        }
        self.messages.push(message);
        self.sort_by_timestamp();
        InsertOutcome::Inserted
    }

    /// Find the oldest pending message matching the signature of `message`
    ///
    /// Used by the send pipeline to locate the optimistic entry a confirmation
    /// should replace.
    pub fn find_pending_match(&self, message: &Message, policy: DedupPolicy) -> Option<String> {
        self.messages
            .iter()
            .find(|m| m.is_pending() && same_signature(m, message, policy.window_ms))
            .map(|m| m.id.clone())
    }

    /// Replace the message with id `old_id` in place
    ///
    /// The replacement keeps the perceived position (the thread is re-sorted
    /// by timestamp, so a confirmation with a close server timestamp lands
    /// where the pending entry sat). Returns false when `old_id` is unknown.
    pub fn replace(&mut self, old_id: &str, replacement: Message) -> bool {
        match self.messages.iter_mut().find(|m| m.id == old_id) {
            Some(slot) => {
                *slot = replacement;
                self.sort_by_timestamp();
                true
            }
            None => false,
        }
    }

    /// Merge an older history page into the thread
    ///
    /// Applies the same near-duplicate filter against the existing set, then
    /// re-sorts the union; the fetched page is never assumed to be ordered
    /// correctly relative to existing state. Returns the number of messages
    /// actually merged.
    pub fn prepend_history(&mut self, older: Vec<Message>, policy: DedupPolicy) -> usize {
        let mut merged = 0;
        for message in older {
            if self.insert(message, policy) == InsertOutcome::Inserted {
                merged += 1;
            }
        }
        merged
    }

    /// Stable ascending sort by timestamp
    pub fn sort_by_timestamp(&mut self) {
        self.messages.sort_by_key(|m| m.timestamp);
    }
}

/// Near-duplicate signature: direction, trimmed content, identity pair, and
/// timestamps within the policy window
fn same_signature(a: &Message, b: &Message, window_ms: i64) -> bool {
    a.is_own == b.is_own
        && a.sender_id == b.sender_id
        && a.receiver_id == b.receiver_id
        && a.content.trim() == b.content.trim()
        && (a.timestamp - b.timestamp).abs() <= window_ms
}
