//! Conversation index with last-message previews

use crate::auth::UserProfile;
use crate::storage::message::Message;
use serde::{Deserialize, Serialize};

/// Condensed last-message record shown in the conversation list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessagePreview {
    /// Message text
    pub content: String,
    /// Unix-epoch milliseconds
    pub timestamp: i64,
    /// Direction flag of the previewed message
    pub is_own: bool,
}

/// One entry in the conversation list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationPreview {
    /// Counterpart profile snapshot
    pub counterpart: UserProfile,
    /// Newest message touching this conversation, if any
    pub last_message: Option<MessagePreview>,
    /// Whether this conversation holds messages the user has not seen
    pub unread: bool,
}

impl ConversationPreview {
    /// Entry with no message history yet
    pub fn empty(counterpart: UserProfile) -> Self {
        Self {
            counterpart,
            last_message: None,
            unread: false,
        }
    }

    /// Entry previewing the given message
    pub fn from_message(counterpart: UserProfile, message: &Message) -> Self {
        Self {
            counterpart,
            last_message: Some(MessagePreview {
                content: message.content.clone(),
                timestamp: message.timestamp,
                is_own: message.is_own,
            }),
            unread: !message.is_own,
        }
    }

    fn last_timestamp(&self) -> i64 {
        self.last_message.as_ref().map(|m| m.timestamp).unwrap_or(i64::MIN)
    }
}

/// The set of known counterpart-conversations
///
/// Exactly one entry per counterpart identity, ordered by last-message
/// timestamp descending with stable insertion order breaking ties. Entries
/// are never hard-deleted by the core.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationIndex {
    /// Entries in display order
    pub entries: Vec<ConversationPreview>,
}

impl ConversationIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of conversations
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up an entry by counterpart identity
    pub fn get(&self, counterpart_id: &str) -> Option<&ConversationPreview> {
        self.entries.iter().find(|e| e.counterpart.id == counterpart_id)
    }

    /// Insert or merge an entry for the preview's counterpart
    ///
    /// When an entry exists, profile fields only ever improve (a sparser
    /// update never erases known fields) and the newer last-message preview
    /// wins. The list is re-sorted after every mutation.
    pub fn upsert(&mut self, preview: ConversationPreview) {
        match self
            .entries
            .iter_mut()
            .find(|e| e.counterpart.id == preview.counterpart.id)
        {
            Some(existing) => {
                existing.counterpart.merge_from(&preview.counterpart);
                if preview.last_timestamp() >= existing.last_timestamp() {
                    if let Some(last) = preview.last_message {
                        existing.last_message = Some(last);
                        existing.unread = preview.unread;
                    }
                }
            }
            None => self.entries.push(preview),
        }
        self.sort_by_recency();
    }

    /// Clear the unread flag on one conversation
    pub fn mark_read(&mut self, counterpart_id: &str) {
        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|e| e.counterpart.id == counterpart_id)
        {
            entry.unread = false;
        }
    }

    /// Replace the whole index with a server-authoritative set
    ///
    /// Unread flags are client-local state the server does not know about, so
    /// they are carried over from the entries being replaced.
    pub fn replace_all(&mut self, entries: Vec<ConversationPreview>) {
        let unread: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.unread)
            .map(|e| e.counterpart.id.clone())
            .collect();
        self.entries = entries;
        for entry in &mut self.entries {
            if unread.iter().any(|id| *id == entry.counterpart.id) {
                entry.unread = true;
            }
        }
        self.sort_by_recency();
    }

    /// Ordered view of the entries
    pub fn list(&self) -> &[ConversationPreview] {
        &self.entries
    }

    /// Stable descending sort by last-message timestamp
    fn sort_by_recency(&mut self) {
        self.entries
            .sort_by_key(|e| std::cmp::Reverse(e.last_timestamp()));
    }
}
