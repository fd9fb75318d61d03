// Conversation Tests - Testing the conversation index

use crate::auth::UserProfile;
use crate::storage::conversation::{ConversationIndex, ConversationPreview, MessagePreview};
use crate::storage::message::{DeliveryState, Message};

fn profile(id: &str, name: &str) -> UserProfile {
    UserProfile {
        id: id.to_string(),
        display_name: name.to_string(),
        avatar_url: Some(format!("https://cdn.example.com/{}.png", id)),
        email: None,
        role: None,
    }
}

fn inbound(sender: &str, content: &str, timestamp: i64) -> Message {
    Message {
        id: format!("m-{}-{}", sender, timestamp),
        sender_id: sender.to_string(),
        receiver_id: "u1".to_string(),
        content: content.to_string(),
        timestamp,
        is_own: false,
        delivery: DeliveryState::Confirmed,
    }
}

#[test]
fn test_upsert_creates_single_entry_per_counterpart() {
    let mut index = ConversationIndex::new();

    for ts in [1_000, 2_000, 3_000] {
        let msg = inbound("u2", "hello", ts);
        index.upsert(ConversationPreview::from_message(profile("u2", "Ada"), &msg));
    }

    assert_eq!(index.len(), 1);
    let entry = index.get("u2").expect("entry present");
    let preview = entry.last_message.as_ref().expect("preview present");
    assert_eq!(preview.timestamp, 3_000);
}

#[test]
fn test_upsert_keeps_newest_preview() {
    let mut index = ConversationIndex::new();

    let newer = inbound("u2", "newer", 5_000);
    let older = inbound("u2", "older", 1_000);
    index.upsert(ConversationPreview::from_message(profile("u2", "Ada"), &newer));
    index.upsert(ConversationPreview::from_message(profile("u2", "Ada"), &older));

    let entry = index.get("u2").expect("entry present");
    assert_eq!(
        entry.last_message.as_ref().map(|m| m.content.as_str()),
        Some("newer")
    );
}

#[test]
fn test_sparser_update_never_erases_profile_fields() {
    let mut index = ConversationIndex::new();
    index.upsert(ConversationPreview::empty(profile("u2", "Ada")));

    // a bare profile (id-only) arrives with a newer message
    let msg = inbound("u2", "hi", 9_000);
    index.upsert(ConversationPreview::from_message(UserProfile::bare("u2"), &msg));

    let entry = index.get("u2").expect("entry present");
    assert_eq!(entry.counterpart.display_name, "Ada");
    assert!(entry.counterpart.avatar_url.is_some());
    assert_eq!(
        entry.last_message.as_ref().map(|m| m.content.as_str()),
        Some("hi")
    );
}

#[test]
fn test_ordering_is_by_recency_descending() {
    let mut index = ConversationIndex::new();

    index.upsert(ConversationPreview::from_message(
        profile("u2", "Ada"),
        &inbound("u2", "first", 1_000),
    ));
    index.upsert(ConversationPreview::from_message(
        profile("u3", "Ben"),
        &inbound("u3", "second", 2_000),
    ));
    index.upsert(ConversationPreview::from_message(
        profile("u4", "Cya"),
        &inbound("u4", "third", 3_000),
    ));

    let ids: Vec<&str> = index.list().iter().map(|e| e.counterpart.id.as_str()).collect();
    assert_eq!(ids, vec!["u4", "u3", "u2"]);

    // a new message bubbles its conversation to the top
    index.upsert(ConversationPreview::from_message(
        profile("u2", "Ada"),
        &inbound("u2", "fresh", 9_000),
    ));
    let ids: Vec<&str> = index.list().iter().map(|e| e.counterpart.id.as_str()).collect();
    assert_eq!(ids, vec!["u2", "u4", "u3"]);
}

#[test]
fn test_ties_keep_insertion_order() {
    let mut index = ConversationIndex::new();

    index.upsert(ConversationPreview::from_message(
        profile("u2", "Ada"),
        &inbound("u2", "a", 5_000),
    ));
    index.upsert(ConversationPreview::from_message(
        profile("u3", "Ben"),
        &inbound("u3", "b", 5_000),
    ));

    let ids: Vec<&str> = index.list().iter().map(|e| e.counterpart.id.as_str()).collect();
    assert_eq!(ids, vec!["u2", "u3"]);
}

#[test]
fn test_mark_read_clears_unread() {
    let mut index = ConversationIndex::new();
    index.upsert(ConversationPreview::from_message(
        profile("u2", "Ada"),
        &inbound("u2", "hello", 1_000),
    ));
    assert!(index.get("u2").expect("entry").unread);

    index.mark_read("u2");
    assert!(!index.get("u2").expect("entry").unread);
}

#[test]
fn test_replace_all_carries_unread_flags() {
    let mut index = ConversationIndex::new();
    index.upsert(ConversationPreview::from_message(
        profile("u2", "Ada"),
        &inbound("u2", "hello", 1_000),
    ));
    assert!(index.get("u2").expect("entry").unread);

    // the server set knows nothing about local unread state
    let server_set = vec![
        ConversationPreview {
            counterpart: profile("u2", "Ada"),
            last_message: Some(MessagePreview {
                content: "hello".to_string(),
                timestamp: 1_000,
                is_own: false,
            }),
            unread: false,
        },
        ConversationPreview::empty(profile("u3", "Ben")),
    ];
    index.replace_all(server_set);

    assert_eq!(index.len(), 2);
    assert!(index.get("u2").expect("entry").unread);
    assert!(!index.get("u3").expect("entry").unread);
}
