use super::*;
use tokio::time::{Duration, timeout};

async fn next_event(events: &mut StorageEvents) -> StorageEvent {
    timeout(Duration::from_millis(200), events.recv())
        .await
        .expect("storage event timed out")
        .expect("storage closed")
}

async fn assert_no_event(events: &mut StorageEvents) {
    assert!(
        timeout(Duration::from_millis(50), events.recv()).await.is_err(),
        "expected no storage event"
    );
}

#[test]
fn set_get_remove() {
    let store = LocalStore::new();
    assert_eq!(store.get_item("k").unwrap(), None);
    store.set_item("k", "v").unwrap();
    assert_eq!(store.get_item("k").unwrap().as_deref(), Some("v"));
    store.remove_item("k").unwrap();
    assert_eq!(store.get_item("k").unwrap(), None);
    assert_eq!(store.used_bytes(), 0);
}

#[test]
fn tabs_share_items() {
    let store = LocalStore::new();
    let other = store.tab();
    assert_ne!(store.origin(), other.origin());
    other.set_item("shared", "1").unwrap();
    assert_eq!(store.get_item("shared").unwrap().as_deref(), Some("1"));
    assert_eq!(store.keys().unwrap(), vec!["shared".to_string()]);
}

#[test]
fn keys_are_sorted() {
    let store = LocalStore::new();
    store.set_item("b", "").unwrap();
    store.set_item("a", "").unwrap();
    store.set_item("c", "").unwrap();
    assert_eq!(store.keys().unwrap(), vec!["a", "b", "c"]);
}

#[test]
fn quota_rejects_oversized_writes_and_keeps_previous_value() {
    let store = LocalStore::with_quota(10);
    store.set_item("k", "12345").unwrap();
    assert_eq!(store.used_bytes(), 6);

    let err = store.set_item("k", "1234567890").unwrap_err();
    assert_eq!(err, StorageError::QuotaExceeded { quota: 10, required: 11 });
    assert_eq!(store.get_item("k").unwrap().as_deref(), Some("12345"));

    // Overwriting counts the old value as freed.
    store.set_item("k", "123456789").unwrap();
    assert_eq!(store.used_bytes(), 10);
}

#[tokio::test]
async fn change_feed_skips_own_writes() {
    let store = LocalStore::new();
    let other = store.tab();
    let mut own_events = store.subscribe().expect("local store has a change feed");

    store.set_item("mine", "1").unwrap();
    assert_no_event(&mut own_events).await;

    other.set_item("theirs", "2").unwrap();
    let event = next_event(&mut own_events).await;
    assert_eq!(event.key, "theirs");
    assert_eq!(event.new_value.as_deref(), Some("2"));
    assert_eq!(event.origin, other.origin());
}

#[tokio::test]
async fn removal_is_announced_once() {
    let store = LocalStore::new();
    let other = store.tab();
    let mut events = store.subscribe().expect("change feed");

    other.set_item("k", "v").unwrap();
    let _ = next_event(&mut events).await;

    other.remove_item("k").unwrap();
    let event = next_event(&mut events).await;
    assert_eq!(event.new_value, None);

    // Removing a missing key is silent.
    other.remove_item("k").unwrap();
    assert_no_event(&mut events).await;
}
