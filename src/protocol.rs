//! Wire protocol module
//!
//! This module defines the frames exchanged over the socket session, the raw
//! shapes returned by the REST API, and the single ingestion boundary that
//! turns them into the canonical types the rest of the core operates on.
//!
//! Servers and older clients are loose about field names (`senderId` at the
//! top level vs. a nested `sender.userId`); every such shape is accepted here
//! and normalized exactly once, immediately after a fetch or frame arrives.
//! Nothing past this module ever sees a raw wire value.

use crate::auth::UserProfile;
use crate::storage::conversation::ConversationPreview;
use crate::storage::message::{DeliveryState, Message};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Well-known destination for outbound chat publishes
pub const SEND_DESTINATION: &str = "/app/chat";

/// Inbox topic for a given identity
pub fn inbox_topic(user_id: &str) -> String {
    format!("inbox/{}", user_id)
}

/// Payload published on a send, and posted to the REST fallback endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendPayload {
    /// Identity of the sending user
    pub sender_id: String,
    /// Identity of the receiving user
    pub receiver_id: String,
    /// Message text
    pub content: String,
}

/// Frames sent by the client over the socket session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientFrame {
    /// Subscribe to a topic (the per-identity inbox)
    Subscribe {
        /// Topic to subscribe to
        topic: String,
    },
    /// Unsubscribe from a topic
    Unsubscribe {
        /// Topic to unsubscribe from
        topic: String,
    },
    /// Publish a chat message to the send destination
    Send {
        /// Well-known send destination
        destination: String,
        /// The message payload
        payload: SendPayload,
    },
}

/// Frames delivered by the server over the socket session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerFrame {
    /// A message frame delivered on a subscribed topic
    Message {
        /// Topic the frame was delivered on
        topic: String,
        /// Raw message body
        message: WireMessage,
    },
}

/// Loose party reference as some payloads nest it (`sender.userId`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WireParty {
    /// Identity id
    pub user_id: Option<String>,
    /// Display name, when the server enriches the payload
    pub display_name: Option<String>,
}

/// Raw message shape as received from socket frames and history pages
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WireMessage {
    /// Server-assigned message id
    pub id: Option<String>,
    /// Flat sender identity
    pub sender_id: Option<String>,
    /// Flat receiver identity
    pub receiver_id: Option<String>,
    /// Nested sender reference
    pub sender: Option<WireParty>,
    /// Nested receiver reference
    pub receiver: Option<WireParty>,
    /// Message text
    pub content: Option<String>,
    /// Unix-epoch milliseconds
    pub timestamp: Option<i64>,
}

impl WireMessage {
    /// Build the wire shape for a confirmed message (test relays, fixtures)
    pub fn confirmed(id: &str, sender_id: &str, receiver_id: &str, content: &str, timestamp: i64) -> Self {
        Self {
            id: Some(id.to_string()),
            sender_id: Some(sender_id.to_string()),
            receiver_id: Some(receiver_id.to_string()),
            sender: None,
            receiver: None,
            content: Some(content.to_string()),
            timestamp: Some(timestamp),
        }
    }

    /// Normalize into the canonical [`Message`] shape
    ///
    /// `me` is the live current user's identity; it decides the direction
    /// flag. Returns `None` when the frame is unusable (no resolvable sender,
    /// receiver, or content); callers drop such frames with a warning, they
    /// never crash the subscription.
    ///
    /// A frame without a server id gets a synthetic one; deduplication of a
    /// redelivered copy then rests on the near-duplicate signature instead of
    /// the id.
    pub fn normalize(&self, me: &str) -> Option<Message> {
        let sender_id = pick_identity(&self.sender_id, &self.sender)?;
        let receiver_id = pick_identity(&self.receiver_id, &self.receiver)?;
        let content = self.content.clone()?;
        let timestamp = self
            .timestamp
            .unwrap_or_else(|| chrono::Utc::now().timestamp_millis());
        let id = self
            .id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        Some(Message {
            id,
            is_own: sender_id == me,
            sender_id,
            receiver_id,
            content,
            timestamp,
            delivery: DeliveryState::Confirmed,
        })
    }
}

/// Resolve an identity from the flat field or the nested party reference
fn pick_identity(flat: &Option<String>, nested: &Option<WireParty>) -> Option<String> {
    flat.clone()
        .or_else(|| nested.as_ref().and_then(|p| p.user_id.clone()))
        .filter(|id| !id.is_empty())
}

/// Raw directory profile shape
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WireProfile {
    /// Identity id
    pub id: Option<String>,
    /// Alternate identity field used by older endpoints
    pub user_id: Option<String>,
    /// Display name
    pub display_name: Option<String>,
    /// Alternate display-name field
    pub name: Option<String>,
    /// Avatar image reference
    pub avatar_url: Option<String>,
    /// Account email
    pub email: Option<String>,
    /// Account role
    pub role: Option<String>,
}

impl WireProfile {
    /// Normalize into a [`UserProfile`], or `None` without a usable id
    pub fn normalize(&self) -> Option<UserProfile> {
        let id = self
            .id
            .clone()
            .or_else(|| self.user_id.clone())
            .filter(|id| !id.is_empty())?;
        let display_name = self
            .display_name
            .clone()
            .or_else(|| self.name.clone())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| id.clone());

        Some(UserProfile {
            id,
            display_name,
            avatar_url: self.avatar_url.clone(),
            email: self.email.clone(),
            role: self.role.clone(),
        })
    }
}

/// Raw conversation-preview shape from the conversation-list endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WireConversation {
    /// The counterpart's profile
    pub user: Option<WireProfile>,
    /// The newest message touching this conversation
    pub last_message: Option<WireMessage>,
}

impl WireConversation {
    /// Normalize into a [`ConversationPreview`], or `None` without a counterpart
    pub fn normalize(&self, me: &str) -> Option<ConversationPreview> {
        let counterpart = self.user.as_ref().and_then(|p| p.normalize())?;
        if counterpart.id == me {
            return None;
        }
        let last = self.last_message.as_ref().and_then(|m| m.normalize(me));
        Some(match last {
            Some(message) => ConversationPreview::from_message(counterpart, &message),
            None => ConversationPreview::empty(counterpart),
        })
    }
}
