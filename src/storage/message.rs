//! Message structures and delivery state tracking

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Prefix tagging locally-generated temporary ids
///
/// A message carries a temporary id from the optimistic insert until its
/// confirmation replaces it with the server-assigned id.
pub const TEMP_ID_PREFIX: &str = "tmp-";

/// Content written into a message whose delivery permanently failed
pub const SEND_FAILED_MARKER: &str = "⚠ Message could not be sent";

/// Delivery state of a message from the sender's perspective
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryState {
    /// Optimistically inserted, not yet confirmed by the server
    Pending,
    /// Confirmed by the server (inbound messages are always confirmed)
    Confirmed,
    /// Delivery failed; surfaced to the user, never retried automatically
    Failed,
}

/// Canonical message shape
///
/// Produced only by the ingestion boundary ([`crate::protocol::WireMessage::normalize`])
/// or by the send pipeline; the rest of the core never sees a raw wire value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Server-assigned id once confirmed, temporary id while in flight
    pub id: String,
    /// Sender identity id
    pub sender_id: String,
    /// Receiver identity id
    pub receiver_id: String,
    /// Message text
    pub content: String,
    /// Unix-epoch milliseconds
    pub timestamp: i64,
    /// Direction flag: true when sent by the current user
    pub is_own: bool,
    /// Delivery state
    pub delivery: DeliveryState,
}

impl Message {
    /// Synthesize a pending outgoing message with a temporary id
    pub fn outgoing(sender_id: &str, receiver_id: &str, content: &str) -> Self {
        Self {
            id: format!("{}{}", TEMP_ID_PREFIX, Uuid::new_v4()),
            sender_id: sender_id.to_string(),
            receiver_id: receiver_id.to_string(),
            content: content.to_string(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            is_own: true,
            delivery: DeliveryState::Pending,
        }
    }

    /// Whether this message still carries a locally-generated temporary id
    pub fn has_temp_id(&self) -> bool {
        self.id.starts_with(TEMP_ID_PREFIX)
    }

    /// Whether this message awaits confirmation
    pub fn is_pending(&self) -> bool {
        self.delivery == DeliveryState::Pending
    }

    /// Mark delivery as permanently failed
    ///
    /// The content is replaced with the failure marker so the user sees which
    /// message did not go through.
    pub fn mark_failed(&mut self) {
        self.delivery = DeliveryState::Failed;
        self.content = SEND_FAILED_MARKER.to_string();
    }

    /// Human-readable delivery status indicator
    pub fn status_indicator(&self) -> &str {
        match self.delivery {
            DeliveryState::Pending => "…",
            DeliveryState::Confirmed => "✓",
            DeliveryState::Failed => "✗",
        }
    }

    /// Human-readable delivery status text
    pub fn status_text(&self) -> &str {
        match self.delivery {
            DeliveryState::Pending => "sending",
            DeliveryState::Confirmed => "sent",
            DeliveryState::Failed => "failed",
        }
    }
}
