//! Minimized chat bubble management
//!
//! A bubble is a parked conversation retained in metadata-only form: the
//! counterpart profile snapshot and a last-touch timestamp. Message bodies
//! are intentionally not persisted with bubbles to bound storage size; they
//! are rehydrated through a fresh history fetch on restore.

use crate::auth::UserProfile;
use serde::{Deserialize, Serialize};

/// One parked conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatBubble {
    /// Counterpart profile snapshot
    pub counterpart: UserProfile,
    /// Unix-epoch milliseconds of the park/last update
    pub last_touch: i64,
}

/// The set of parked conversations, at most one bubble per counterpart
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BubbleSet {
    /// Bubbles in park order
    pub bubbles: Vec<ChatBubble>,
}

impl BubbleSet {
    /// Create an empty bubble set
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of parked conversations
    pub fn len(&self) -> usize {
        self.bubbles.len()
    }

    /// Whether no conversations are parked
    pub fn is_empty(&self) -> bool {
        self.bubbles.is_empty()
    }

    /// Whether a bubble exists for the given counterpart
    pub fn contains(&self, counterpart_id: &str) -> bool {
        self.bubbles.iter().any(|b| b.counterpart.id == counterpart_id)
    }

    /// Look up a bubble by counterpart identity
    pub fn get(&self, counterpart_id: &str) -> Option<&ChatBubble> {
        self.bubbles.iter().find(|b| b.counterpart.id == counterpart_id)
    }

    /// Park a conversation, updating the existing bubble if one exists
    pub fn park(&mut self, counterpart: UserProfile, now_ms: i64) {
        match self
            .bubbles
            .iter_mut()
            .find(|b| b.counterpart.id == counterpart.id)
        {
            Some(bubble) => {
                bubble.counterpart.merge_from(&counterpart);
                bubble.last_touch = now_ms;
            }
            None => self.bubbles.push(ChatBubble {
                counterpart,
                last_touch: now_ms,
            }),
        }
    }

    /// Remove and return the bubble for a counterpart, if parked
    pub fn remove(&mut self, counterpart_id: &str) -> Option<ChatBubble> {
        let index = self
            .bubbles
            .iter()
            .position(|b| b.counterpart.id == counterpart_id)?;
        Some(self.bubbles.remove(index))
    }
}
