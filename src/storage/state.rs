//! The single state container the engine mutates and the UI reads
//!
//! All message and conversation truth lives here. Mutations are serialized
//! through one lock in the engine, so every asynchronous completion applies
//! a discrete mutation atomically relative to the others.

use crate::auth::UserProfile;
use crate::socket::ConnectionState;
use crate::storage::bubble::BubbleSet;
use crate::storage::conversation::ConversationIndex;
use crate::storage::thread::MessageThread;
use serde::{Deserialize, Serialize};

/// The conversation currently open in the chat view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveConversation {
    /// Counterpart profile snapshot
    pub counterpart: UserProfile,
    /// The visible message sequence
    pub thread: MessageThread,
    /// Next history page index to request (oldest-ward)
    pub page: u32,
    /// Whether a prior page came back empty (end of history)
    pub history_exhausted: bool,
    /// Whether a history load is currently in flight
    pub loading_history: bool,
}

impl ActiveConversation {
    /// Open a conversation with a reset pagination cursor
    pub fn new(counterpart: UserProfile) -> Self {
        Self {
            counterpart,
            thread: MessageThread::new(),
            page: 0,
            history_exhausted: false,
            loading_history: false,
        }
    }

    /// Whether this conversation is with the given counterpart
    pub fn is_with(&self, counterpart_id: &str) -> bool {
        self.counterpart.id == counterpart_id
    }
}

/// Client-side state for the messaging feature
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatState {
    /// The active conversation, if one is open
    pub active: Option<ActiveConversation>,
    /// Known counterpart-conversations with previews
    pub conversations: ConversationIndex,
    /// Parked conversations (metadata only)
    pub bubbles: BubbleSet,
    /// Socket session state
    pub connection: ConnectionState,
    /// Global indicator that unseen inbound messages exist
    pub has_unread: bool,
    /// Whether the chat view for the active conversation is visible
    pub chat_open: bool,
    /// Whether the conversation list is visible
    pub list_open: bool,
    /// Last non-fatal fetch error, surfaced to the UI as a state field
    pub error: Option<String>,
}

impl ChatState {
    /// Create an empty state
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `counterpart` the active conversation
    ///
    /// Resets the pagination cursor and the history-exhausted flag, opens the
    /// chat view, and clears the unread indicator for this counterpart.
    pub fn activate(&mut self, counterpart: UserProfile) {
        self.conversations.mark_read(&counterpart.id);
        self.active = Some(ActiveConversation::new(counterpart));
        self.chat_open = true;
        self.has_unread = false;
    }

    /// Park the active conversation into the bubble set, if any
    ///
    /// Returns the parked counterpart's identity.
    pub fn park_active(&mut self, now_ms: i64) -> Option<String> {
        let active = self.active.take()?;
        let id = active.counterpart.id.clone();
        self.bubbles.park(active.counterpart, now_ms);
        self.chat_open = false;
        Some(id)
    }

    /// Whether the active conversation matches the counterpart
    pub fn active_is_with(&self, counterpart_id: &str) -> bool {
        self.active
            .as_ref()
            .is_some_and(|a| a.is_with(counterpart_id))
    }

    /// Whether the user is currently looking at this counterpart's chat
    pub fn viewing(&self, counterpart_id: &str) -> bool {
        self.chat_open && self.active_is_with(counterpart_id)
    }

    /// Best locally-known profile for a counterpart
    ///
    /// Consults the active conversation, the conversation index, and the
    /// bubble set, in that order.
    pub fn known_profile(&self, counterpart_id: &str) -> Option<UserProfile> {
        if let Some(active) = &self.active {
            if active.is_with(counterpart_id) {
                return Some(active.counterpart.clone());
            }
        }
        if let Some(entry) = self.conversations.get(counterpart_id) {
            return Some(entry.counterpart.clone());
        }
        self.bubbles.get(counterpart_id).map(|b| b.counterpart.clone())
    }
}
