// Bubble Tests - Testing the minimized-conversation set

use crate::auth::UserProfile;
use crate::storage::bubble::BubbleSet;

fn profile(id: &str, name: &str) -> UserProfile {
    UserProfile {
        id: id.to_string(),
        display_name: name.to_string(),
        avatar_url: None,
        email: None,
        role: None,
    }
}

#[test]
fn test_park_creates_one_bubble_per_counterpart() {
    let mut set = BubbleSet::new();

    set.park(profile("u2", "Ada"), 1_000);
    set.park(profile("u2", "Ada"), 2_000);

    assert_eq!(set.len(), 1);
    let bubble = set.get("u2").expect("bubble present");
    assert_eq!(bubble.last_touch, 2_000);
}

#[test]
fn test_repark_merges_profile_fields() {
    let mut set = BubbleSet::new();

    let mut full = profile("u2", "Ada");
    full.avatar_url = Some("https://cdn.example.com/u2.png".to_string());
    set.park(full, 1_000);

    // a bare snapshot must not erase the known avatar
    set.park(UserProfile::bare("u2"), 2_000);

    let bubble = set.get("u2").expect("bubble present");
    assert_eq!(bubble.counterpart.display_name, "Ada");
    assert!(bubble.counterpart.avatar_url.is_some());
}

#[test]
fn test_remove_pops_the_bubble() {
    let mut set = BubbleSet::new();
    set.park(profile("u2", "Ada"), 1_000);
    set.park(profile("u3", "Ben"), 2_000);

    let removed = set.remove("u2").expect("bubble removed");
    assert_eq!(removed.counterpart.id, "u2");
    assert!(!set.contains("u2"));
    assert!(set.contains("u3"));
    assert!(set.remove("u2").is_none());
}
