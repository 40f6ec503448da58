/// Sweeper task against a live tokio runtime.
use std::sync::Arc;
use std::time::Duration;

use tom_expiry::{
    spawn_sweeper, ExpirationStarter, ExpiryError, ExpiryMode, ManualClock, MemoryExpirationStore,
    MessageKey, SqliteExpirationStore,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[tokio::test]
async fn sweeper_reports_expired_batches() {
    init_tracing();
    let store = Arc::new(MemoryExpirationStore::new());
    let clock = Arc::new(ManualClock::new(0));

    let key = MessageKey::new(1_000, "alice");
    store.insert_message(&key, ExpiryMode::AfterSend(5), 0).unwrap();
    store.start_any_expiration(1_000, "alice", 1_000).unwrap();

    let (handle, mut removed_rx) =
        spawn_sweeper(store.clone(), clock.clone(), Duration::from_millis(10));

    // Not yet due.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(removed_rx.try_recv().is_err());
    assert!(store.contains(&key).unwrap());

    clock.set(6_000);
    let batch = tokio::time::timeout(Duration::from_secs(2), removed_rx.recv())
        .await
        .expect("sweeper should report within timeout")
        .expect("channel open");
    assert_eq!(batch, vec![key.clone()]);
    assert!(!store.contains(&key).unwrap());

    handle.shutdown().await;
}

#[tokio::test]
async fn sweeper_drives_sqlite_store() {
    init_tracing();
    let store = Arc::new(SqliteExpirationStore::open_in_memory().unwrap());
    let clock = Arc::new(ManualClock::new(100_000));

    for ts in [10_000u64, 20_000, 30_000] {
        let key = MessageKey::new(ts, "bob");
        store.insert_message(&key, ExpiryMode::AfterSend(60), 100_000).unwrap();
        store.start_any_expiration(ts, "bob", ts).unwrap();
    }

    let (handle, mut removed_rx) =
        spawn_sweeper(store.clone(), clock.clone(), Duration::from_millis(10));

    // Deadlines 70_000 / 80_000 / 90_000 are all past.
    let batch = tokio::time::timeout(Duration::from_secs(2), removed_rx.recv())
        .await
        .expect("sweeper should report within timeout")
        .expect("channel open");
    assert_eq!(batch.len(), 3);
    assert_eq!(store.message_count().unwrap(), 0);

    handle.shutdown().await;
}

/// A full store refuses new messages instead of dropping expired ones
/// itself; the sweeper reports the expired message and frees the slot.
#[tokio::test]
async fn full_store_defers_deletion_to_sweeper() {
    init_tracing();
    let store = Arc::new(MemoryExpirationStore::with_capacity(1));
    let clock = Arc::new(ManualClock::new(0));

    let first = MessageKey::new(1, "alice");
    store.insert_message(&first, ExpiryMode::AfterSend(1), 0).unwrap();
    store.start_any_expiration(1, "alice", 1).unwrap();

    let second = MessageKey::new(2, "alice");
    let err = store.insert_message(&second, ExpiryMode::Off, 5_000).unwrap_err();
    assert!(matches!(err, ExpiryError::StoreFull { capacity: 1 }));
    assert!(store.contains(&first).unwrap());

    let (handle, mut removed_rx) =
        spawn_sweeper(store.clone(), clock.clone(), Duration::from_millis(10));
    clock.set(5_000);
    let batch = tokio::time::timeout(Duration::from_secs(2), removed_rx.recv())
        .await
        .expect("sweeper should report within timeout")
        .expect("channel open");
    assert_eq!(batch, vec![first]);

    assert!(store.insert_message(&second, ExpiryMode::Off, 5_000).unwrap());
    handle.shutdown().await;
}
