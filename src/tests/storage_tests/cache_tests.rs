// Cache Tests - Testing the freshness-windowed local cache

use crate::auth::UserProfile;
use crate::storage::bubble::BubbleSet;
use crate::storage::cache::{CacheEntry, CacheStore, CONVERSATIONS_TTL_MS, DIRECTORY_TTL_MS};

fn profile(id: &str) -> UserProfile {
    UserProfile {
        id: id.to_string(),
        display_name: format!("User {}", id),
        avatar_url: None,
        email: None,
        role: None,
    }
}

#[test]
fn test_freshness_window_boundaries() {
    let entry = CacheEntry::new("value", 10_000);

    assert!(entry.is_fresh(5_000, 10_000)); // just written
    assert!(entry.is_fresh(5_000, 15_000)); // exactly at the boundary
    assert!(!entry.is_fresh(5_000, 15_001)); // one past the window
}

#[test]
fn test_freshness_tolerates_clock_skew() {
    // written "in the future" relative to the reader's clock
    let entry = CacheEntry::new("value", 20_000);
    assert!(entry.is_fresh(5_000, 10_000));
}

#[test]
fn test_default_windows_are_bounded() {
    assert_eq!(DIRECTORY_TTL_MS, 5 * 60 * 1_000);
    assert_eq!(CONVERSATIONS_TTL_MS, 2 * 60 * 1_000);
}

#[tokio::test]
async fn test_put_get_roundtrip_preserves_write_time() {
    let store = CacheStore::open_in_memory().expect("Failed to open cache");

    store
        .put("some_key", &vec![1_u32, 2, 3], 42_000)
        .await
        .expect("Failed to put");

    let entry: CacheEntry<Vec<u32>> = store
        .get("some_key")
        .await
        .expect("Failed to get")
        .expect("entry present");
    assert_eq!(entry.value, vec![1, 2, 3]);
    assert_eq!(entry.written_at, 42_000);
}

#[tokio::test]
async fn test_put_overwrites_value_and_write_time() {
    let store = CacheStore::open_in_memory().expect("Failed to open cache");

    store.put("key", &"old", 1_000).await.expect("Failed to put");
    store.put("key", &"new", 2_000).await.expect("Failed to put");

    let entry: CacheEntry<String> = store
        .get("key")
        .await
        .expect("Failed to get")
        .expect("entry present");
    assert_eq!(entry.value, "new");
    assert_eq!(entry.written_at, 2_000);
}

#[tokio::test]
async fn test_get_missing_key_is_none() {
    let store = CacheStore::open_in_memory().expect("Failed to open cache");

    let entry: Option<CacheEntry<String>> = store.get("absent").await.expect("Failed to get");
    assert!(entry.is_none());
}

#[tokio::test]
async fn test_undecodable_entry_is_treated_as_absent() {
    let store = CacheStore::open_in_memory().expect("Failed to open cache");

    // a plain string does not decode as a profile list
    store
        .put("directory", &"not a profile list", 1_000)
        .await
        .expect("Failed to put");

    let entry = store.get_directory().await.expect("Failed to get");
    assert!(entry.is_none());
}

#[tokio::test]
async fn test_typed_directory_snapshot_roundtrip() {
    let store = CacheStore::open_in_memory().expect("Failed to open cache");
    let profiles = vec![profile("u2"), profile("u3")];

    store
        .put_directory(&profiles, 5_000)
        .await
        .expect("Failed to put directory");

    let entry = store
        .get_directory()
        .await
        .expect("Failed to get directory")
        .expect("entry present");
    assert_eq!(entry.value, profiles);
    assert_eq!(entry.written_at, 5_000);
}

#[tokio::test]
async fn test_active_conversation_pointer_clears_on_none() {
    let store = CacheStore::open_in_memory().expect("Failed to open cache");

    store
        .put_active_conversation(Some("u2"), 1_000)
        .await
        .expect("Failed to put pointer");
    let entry = store
        .get_active_conversation()
        .await
        .expect("Failed to get pointer")
        .expect("pointer present");
    assert_eq!(entry.value, "u2");

    store
        .put_active_conversation(None, 2_000)
        .await
        .expect("Failed to clear pointer");
    assert!(store
        .get_active_conversation()
        .await
        .expect("Failed to get pointer")
        .is_none());
}

#[tokio::test]
async fn test_bubble_snapshot_roundtrip() {
    let store = CacheStore::open_in_memory().expect("Failed to open cache");
    let mut bubbles = BubbleSet::new();
    bubbles.park(profile("u2"), 1_000);
    bubbles.park(profile("u3"), 2_000);

    store
        .put_bubbles(&bubbles, 3_000)
        .await
        .expect("Failed to put bubbles");

    let entry = store
        .get_bubbles()
        .await
        .expect("Failed to get bubbles")
        .expect("entry present");
    assert_eq!(entry.value, bubbles);
}

#[tokio::test]
async fn test_cache_persists_across_reopen() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("triptalk_cache.db");

    {
        let store = CacheStore::open(&path).expect("Failed to open cache");
        store
            .put_directory(&[profile("u2")], 7_000)
            .await
            .expect("Failed to put directory");
    }

    let store = CacheStore::open(&path).expect("Failed to reopen cache");
    let entry = store
        .get_directory()
        .await
        .expect("Failed to get directory")
        .expect("entry present");
    assert_eq!(entry.value.len(), 1);
    assert_eq!(entry.value[0].id, "u2");
    assert_eq!(entry.written_at, 7_000);
}
