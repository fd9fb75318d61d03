//! Local state and persistence module
//!
//! This module holds the client-side truth for the messaging core:
//! - `message` - Canonical message shape and delivery states
//! - `thread` - Active conversation's message sequence with the
//!   deduplication/ordering policy
//! - `conversation` - Conversation index with last-message previews
//! - `bubble` - Minimized (parked) conversation metadata
//! - `cache` - Durable freshness-windowed local cache (SQLite)
//! - `state` - The single state container the UI reads and the engine mutates

// Submodules
pub mod bubble;
pub mod cache;
pub mod conversation;
pub mod message;
pub mod state;
pub mod thread;

// Re-export commonly used types
pub use bubble::{BubbleSet, ChatBubble};
pub use cache::{CacheEntry, CacheStore};
pub use conversation::{ConversationIndex, ConversationPreview, MessagePreview};
pub use message::{DeliveryState, Message};
pub use state::{ActiveConversation, ChatState};
pub use thread::{DedupPolicy, InsertOutcome, MessageThread};
