//! Integration tests: several stores replicating through in-process relays.

use serde_json::{json, Value};
use snapsync_engine::{
    ManualClock, RetryConfig, StoreOptions, SyncError, SyncPhase, SyncStore, TokioClock,
};
use snapsync_protocol::{
    Addressing, Entry, Event, GroupKey, Snapshot, SnapshotCipher, WriterIdentity, SNAPSHOT_KIND,
};
use snapsync_relay::{MemoryRelay, RelayConfig, RelayHub};
use snapsync_storage::{InMemoryBackend, StorageError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// One simulated device.
struct Device {
    store: SyncStore,
    relay: Arc<MemoryRelay>,
}

fn options(group: &GroupKey) -> StoreOptions {
    StoreOptions::new("notes")
        .with_group_key(group.clone())
        .with_clock(Arc::new(TokioClock::new()))
}

async fn connect(hub: &RelayHub, options: StoreOptions) -> Device {
    let relay = Arc::new(hub.connect());
    let store = SyncStore::open(options.with_relay(relay.clone()))
        .await
        .unwrap();
    Device { store, relay }
}

/// Waits until `done` holds, re-checking after every merged snapshot.
async fn wait_until(store: &SyncStore, done: impl Fn(&SyncStore) -> bool) {
    loop {
        let next = store.on_receive();
        if done(store) {
            return;
        }
        next.await.unwrap();
    }
}

fn has(key: &'static str, value: Value) -> impl Fn(&SyncStore) -> bool {
    move |store: &SyncStore| store.get(key).unwrap().as_ref() == Some(&value)
}

#[tokio::test(start_paused = true)]
async fn local_writes_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let group = GroupKey::generate();

    {
        let store = SyncStore::open(options(&group).open_file_backend(dir.path()).unwrap())
            .await
            .unwrap();
        store.set("profile", json!({"name": "Ada"})).unwrap();
        store.set("draft", "hello").unwrap();
        store.del("draft").unwrap();
        assert!(store.sync().await.unwrap());
        store.close().await.unwrap();
    }

    let store = SyncStore::open(options(&group).open_file_backend(dir.path()).unwrap())
        .await
        .unwrap();
    assert_eq!(store.get("profile").unwrap(), Some(json!({"name": "Ada"})));
    assert_eq!(store.get("draft").unwrap(), None);
    assert!(store.snapshot()["draft"].is_tombstone());
    assert_eq!(store.live_keys(), vec!["profile".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn typed_reads() {
    #[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Prefs {
        theme: String,
        size: u32,
    }

    let store = SyncStore::open(StoreOptions::new("prefs")).await.unwrap();
    let prefs = Prefs {
        theme: "dark".into(),
        size: 14,
    };
    store.set("prefs", &prefs).unwrap();
    assert_eq!(store.get_as::<Prefs>("prefs").unwrap(), Some(prefs));
    assert_eq!(store.get_as::<Prefs>("missing").unwrap(), None);
    assert!(matches!(
        store.get_as::<u32>("prefs"),
        Err(SyncError::Value(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn last_write_wins_across_writers() {
    let hub = RelayHub::new(RelayConfig::default());
    let group = GroupKey::generate();
    let a = connect(&hub, options(&group)).await;
    let b = connect(&hub, options(&group)).await;

    a.store.set_at("color", json!("blue"), 1000).unwrap();
    b.store.set_at("color", json!("red"), 1100).unwrap();
    assert!(a.store.sync().await.unwrap());
    assert!(b.store.sync().await.unwrap());

    wait_until(&a.store, has("color", json!("red"))).await;
    wait_until(&b.store, |s| s.cursor() > 0).await;

    assert_eq!(a.store.get("color").unwrap(), Some(json!("red")));
    assert_eq!(b.store.get("color").unwrap(), Some(json!("red")));
    assert_eq!(hub.event_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn burst_of_writes_publishes_once() {
    let hub = RelayHub::new(RelayConfig::default());
    let group = GroupKey::generate();
    let a = connect(&hub, options(&group)).await;

    for i in 0..10 {
        a.store.set(&format!("k{i}"), i).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert_eq!(a.store.phase(), SyncPhase::Debouncing);
    assert!(a.store.sync().await.unwrap());

    assert_eq!(a.relay.publish_attempts(), 1);
    assert_eq!(hub.event_count(), 1);
    assert_eq!(a.store.phase(), SyncPhase::Idle);
}

#[tokio::test(start_paused = true)]
async fn follow_up_publish_carries_later_writes() {
    let hub = RelayHub::new(RelayConfig::default());
    let group = GroupKey::generate();
    let a = connect(&hub, options(&group)).await;
    let b = connect(&hub, options(&group)).await;

    a.store.set("one", 1).unwrap();
    assert!(a.store.sync().await.unwrap());
    a.store.set("two", 2).unwrap();
    assert!(a.store.sync().await.unwrap());

    // Both publishes were accepted, so the second carried a newer timestamp.
    assert_eq!(a.relay.publish_attempts(), 2);
    wait_until(&b.store, has("two", json!(2))).await;
    assert_eq!(b.store.get("one").unwrap(), Some(json!(1)));
}

#[tokio::test(start_paused = true)]
async fn offline_writer_catches_up() {
    let hub = RelayHub::new(RelayConfig::default());
    let group = GroupKey::generate();
    let a = connect(&hub, options(&group)).await;
    let b = connect(&hub, options(&group)).await;

    a.relay.set_online(false);
    a.store.set("draft", "written offline").unwrap();

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(a.store.phase(), SyncPhase::Retrying);
    assert_eq!(b.store.get("draft").unwrap(), None);

    a.relay.set_online(true);
    assert!(a.store.sync().await.unwrap());
    wait_until(&b.store, has("draft", json!("written offline"))).await;
}

#[tokio::test(start_paused = true)]
async fn offline_reader_catches_up() {
    let hub = RelayHub::new(RelayConfig::default());
    let group = GroupKey::generate();
    let a = connect(&hub, options(&group)).await;
    let b = connect(&hub, options(&group)).await;

    b.relay.set_online(false);
    a.store.set("news", "while you were away").unwrap();
    assert!(a.store.sync().await.unwrap());
    assert_eq!(b.store.get("news").unwrap(), None);

    b.relay.set_online(true);
    wait_until(&b.store, has("news", json!("while you were away"))).await;
}

#[tokio::test(start_paused = true)]
async fn late_joiner_gets_backlog() {
    let hub = RelayHub::new(RelayConfig::default());
    let group = GroupKey::generate();
    let a = connect(&hub, options(&group)).await;

    a.store.set("greeting", "hi").unwrap();
    assert!(a.store.sync().await.unwrap());

    let b = connect(&hub, options(&group)).await;
    wait_until(&b.store, has("greeting", json!("hi"))).await;
}

#[tokio::test(start_paused = true)]
async fn retry_gives_up_after_max_attempts() {
    let hub = RelayHub::new(RelayConfig::default());
    let group = GroupKey::generate();
    let a = connect(&hub, options(&group).with_retry(RetryConfig::new(3))).await;

    a.relay.set_reject_publishes(true);
    a.store.set("k", 1).unwrap();

    assert!(!a.store.sync().await.unwrap());
    assert_eq!(a.relay.publish_attempts(), 3);
    assert_eq!(a.store.phase(), SyncPhase::Idle);
    assert_eq!(hub.event_count(), 0);

    // The write is still local and the next cycle can succeed.
    a.relay.set_reject_publishes(false);
    a.store.set("k", 2).unwrap();
    assert!(a.store.sync().await.unwrap());
    assert_eq!(hub.event_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn write_while_retrying_publishes_without_waiting_for_backoff() {
    let hub = RelayHub::new(RelayConfig::default());
    let group = GroupKey::generate();
    let retry = RetryConfig::default().with_base_delay(Duration::from_secs(30));
    let a = connect(&hub, options(&group).with_retry(retry)).await;

    a.relay.set_online(false);
    a.store.set("a", 1).unwrap();
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(a.store.phase(), SyncPhase::Retrying);
    assert_eq!(a.relay.publish_attempts(), 1);

    a.relay.set_online(true);
    a.store.set("b", 2).unwrap();
    tokio::time::sleep(Duration::from_millis(1_500)).await;

    assert_eq!(a.relay.publish_attempts(), 2);
    assert_eq!(hub.event_count(), 1);
    assert_eq!(a.store.phase(), SyncPhase::Idle);
    assert!(a.store.sync().await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn one_reachable_relay_is_enough() {
    let good = RelayHub::new(RelayConfig::new("mem://good"));
    let bad = RelayHub::new(RelayConfig::new("mem://bad"));
    let group = GroupKey::generate();

    let good_relay = Arc::new(good.connect());
    let bad_relay = Arc::new(bad.connect());
    bad_relay.set_online(false);
    let a = SyncStore::open(
        options(&group)
            .with_relay(bad_relay.clone())
            .with_relay(good_relay.clone()),
    )
    .await
    .unwrap();
    let b = connect(&good, options(&group)).await;

    a.set("shared", "via good relay").unwrap();
    assert!(a.sync().await.unwrap());

    assert_eq!(good.event_count(), 1);
    assert_eq!(bad.event_count(), 0);
    assert_eq!(bad_relay.publish_attempts(), 1);
    wait_until(&b.store, has("shared", json!("via good relay"))).await;

    // Subscribing failed on the unreachable relay; the good one still feeds a.
    b.store.set("reply", "seen").unwrap();
    assert!(b.store.sync().await.unwrap());
    wait_until(&a, has("reply", json!("seen"))).await;
}

#[tokio::test(start_paused = true)]
async fn manual_clock_stamps_entries_and_events() {
    let hub = RelayHub::new(RelayConfig::default());
    let group = GroupKey::generate();
    let clock = Arc::new(ManualClock::new(1_700_000_000_250));
    let a = connect(&hub, options(&group).with_clock(clock.clone())).await;
    let b = connect(&hub, options(&group)).await;

    a.store.set("color", "blue").unwrap();
    clock.advance(5_000);
    a.store.del("old").unwrap();
    assert!(a.store.sync().await.unwrap());

    let snapshot = a.store.snapshot();
    assert_eq!(snapshot["color"].last_modified, 1_700_000_000_250);
    assert_eq!(snapshot["old"].last_modified, 1_700_000_005_250);

    wait_until(&b.store, has("color", json!("blue"))).await;
    assert_eq!(b.store.cursor(), 1_700_000_005);
    assert_eq!(b.store.snapshot()["old"].last_modified, 1_700_000_005_250);
}

#[tokio::test(start_paused = true)]
async fn tombstones_are_not_resurrected() {
    let hub = RelayHub::new(RelayConfig::default());
    let group = GroupKey::generate();
    let a = connect(&hub, options(&group)).await;
    let b = connect(&hub, options(&group)).await;

    a.store.set_at("task", json!("buy milk"), 100).unwrap();
    assert!(a.store.sync().await.unwrap());
    wait_until(&b.store, has("task", json!("buy milk"))).await;

    a.store.set_at("task", Value::Null, 200).unwrap();
    assert!(a.store.sync().await.unwrap());
    wait_until(&b.store, |s| s.get("task").unwrap().is_none()).await;

    // A third writer still holding an older copy publishes it.
    let stale_writer = WriterIdentity::generate();
    let addressing = Addressing::new("notes", group.topic());
    let mut stale = Snapshot::new();
    stale.insert("task".into(), Entry::new(json!("buy milk"), 150));
    let content = SnapshotCipher::new(&group)
        .unwrap()
        .seal_snapshot(&stale, addressing.namespace_topic())
        .unwrap();
    let event = Event::sign(
        &stale_writer,
        b.store.cursor() + 10,
        SNAPSHOT_KIND,
        addressing.tags(),
        content,
    )
    .unwrap();

    let received = b.store.on_receive();
    hub.accept(event).unwrap();
    received.await.unwrap();

    assert_eq!(b.store.get("task").unwrap(), None);
    assert_eq!(b.store.snapshot()["task"].last_modified, 200);
}

#[tokio::test(start_paused = true)]
async fn cursor_replays_from_last_position_after_restart() {
    let hub = RelayHub::new(RelayConfig::default());
    let group = GroupKey::generate();
    let backend = Arc::new(InMemoryBackend::new());
    let a = connect(&hub, options(&group)).await;
    let b = connect(&hub, options(&group).with_backend(backend.clone())).await;

    a.store.set("version", 1).unwrap();
    assert!(a.store.sync().await.unwrap());
    wait_until(&b.store, has("version", json!(1))).await;
    let first_cursor = b.store.cursor();
    assert!(first_cursor > 0);

    b.store.close().await.unwrap();
    drop(b);

    a.store.set("version", 2).unwrap();
    assert!(a.store.sync().await.unwrap());

    let b = connect(&hub, options(&group).with_backend(backend)).await;
    assert!(b.store.cursor() >= first_cursor);
    wait_until(&b.store, has("version", json!(2))).await;
    assert!(b.store.cursor() > first_cursor);
}

#[tokio::test(start_paused = true)]
async fn persistence_failure_is_reported_and_not_published() {
    let hub = RelayHub::new(RelayConfig::default());
    let group = GroupKey::generate();
    let backend = Arc::new(InMemoryBackend::new());
    let a = connect(&hub, options(&group).with_backend(backend.clone())).await;

    backend.set_fail_writes(true);
    let err = a.store.set("k", 1).unwrap_err();
    assert!(matches!(err, SyncError::Storage(StorageError::Io(_))));
    assert_eq!(a.store.get("k").unwrap(), None);
    assert_eq!(a.store.phase(), SyncPhase::Idle);
    assert!(a.store.sync().await.unwrap());
    assert_eq!(a.relay.publish_attempts(), 0);
}

#[tokio::test(start_paused = true)]
async fn change_listeners() {
    let hub = RelayHub::new(RelayConfig::default());
    let group = GroupKey::generate();
    let a = connect(&hub, options(&group)).await;
    let b = connect(&hub, options(&group)).await;

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let _panicky = b.store.on_change(|_, _| panic!("listener bug")).unwrap();
    let _counting = b.store.on_change(move |key, value| {
        assert_eq!(key, "x");
        assert_eq!(value, &json!(1));
        counter.fetch_add(1, Ordering::SeqCst);
    })
    .unwrap();
    let removed_calls = Arc::new(AtomicUsize::new(0));
    let removed_counter = removed_calls.clone();
    let removed = b
        .store
        .on_change(move |_, _| {
            removed_counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    assert!(removed.unsubscribe());

    let once = b.store.on_change_once();
    a.store.set("x", 1).unwrap();
    assert!(a.store.sync().await.unwrap());

    assert_eq!(once.await.unwrap(), ("x".to_string(), json!(1)));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(removed_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn local_writes_do_not_fire_listeners() {
    let store = SyncStore::open(StoreOptions::new("notes")).await.unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let _sub = store
        .on_change(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    store.set("k", 1).unwrap();
    assert!(store.sync().await.unwrap());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn namespaces_and_groups_are_isolated() {
    let hub = RelayHub::new(RelayConfig::default());
    let group = GroupKey::generate();
    let a = connect(&hub, options(&group)).await;
    let peer = connect(&hub, options(&group)).await;
    let other_namespace = connect(
        &hub,
        StoreOptions::new("todo")
            .with_group_key(group.clone())
            .with_clock(Arc::new(TokioClock::new())),
    )
    .await;
    let other_group = connect(&hub, options(&GroupKey::generate())).await;

    a.store.set("secret", "only for notes").unwrap();
    assert!(a.store.sync().await.unwrap());
    wait_until(&peer.store, has("secret", json!("only for notes"))).await;

    assert_eq!(other_namespace.store.get("secret").unwrap(), None);
    assert_eq!(other_namespace.store.cursor(), 0);
    assert_eq!(other_group.store.get("secret").unwrap(), None);
    assert_eq!(other_group.store.cursor(), 0);
}

#[tokio::test(start_paused = true)]
async fn exported_keys_restore_identity() {
    let hub = RelayHub::new(RelayConfig::default());
    let group = GroupKey::generate();
    let a = connect(&hub, options(&group)).await;

    let keys = a.store.keys();
    let (writer, group_key) = keys.parse().unwrap();
    assert_eq!(writer.id(), a.store.writer_id());
    assert_eq!(group_key.topic(), a.store.group_topic());

    let restored = SyncStore::open(
        StoreOptions::new("notes")
            .with_writer(writer)
            .with_group_key(group_key),
    )
    .await
    .unwrap();
    assert_eq!(restored.writer_id(), a.store.writer_id());
    assert_eq!(restored.namespace(), "notes");
}

#[tokio::test(start_paused = true)]
async fn close_releases_waiters_and_relays() {
    let hub = RelayHub::new(RelayConfig::default());
    let group = GroupKey::generate();
    let a = connect(&hub, options(&group)).await;
    assert_eq!(hub.connection_count(), 1);

    let pending_receive = a.store.on_receive();
    let pending_change = a.store.on_change_once();
    a.store.close().await.unwrap();

    assert!(matches!(pending_receive.await, Err(SyncError::Closed)));
    assert!(matches!(pending_change.await, Err(SyncError::Closed)));
    assert!(matches!(a.store.get("k"), Err(SyncError::Closed)));
    assert!(matches!(a.store.set("k", 1), Err(SyncError::Closed)));
    assert!(matches!(a.store.sync().await, Err(SyncError::Closed)));
    assert!(matches!(a.store.on_change(|_, _| {}), Err(SyncError::Closed)));
    assert!(a.store.is_closed());
    assert_eq!(hub.connection_count(), 0);

    // Closing twice is fine.
    a.store.close().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn close_during_debounce_resolves_sync_as_closed() {
    let hub = RelayHub::new(RelayConfig::default());
    let group = GroupKey::generate();
    let a = Arc::new(connect(&hub, options(&group)).await);

    a.store.set("k", 1).unwrap();
    let device = Arc::clone(&a);
    let waiter = tokio::spawn(async move { device.store.sync().await });
    tokio::task::yield_now().await;

    a.store.close().await.unwrap();
    assert!(matches!(waiter.await.unwrap(), Err(SyncError::Closed)));
    assert_eq!(a.relay.publish_attempts(), 0);
}

#[tokio::test]
async fn empty_namespace_is_rejected() {
    let err = SyncStore::open(StoreOptions::new("")).await.unwrap_err();
    assert!(matches!(err, SyncError::Configuration(_)));
}
