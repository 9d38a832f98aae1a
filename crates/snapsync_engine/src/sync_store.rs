//! The public store handle.

use crate::clock::Clock;
use crate::config::StoreOptions;
use crate::error::{SyncError, SyncResult};
use crate::merger::{self, Merger};
use crate::observers::{ChangeSubscription, Observers};
use crate::scheduler::{Publisher, SchedulerHandle, SyncPhase};
use crate::store::LocalSnapshotStore;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use snapsync_protocol::{
    Addressing, Entry, ExportedKeys, GroupKey, GroupTopic, Relay, Snapshot, SnapshotCipher, WriterId,
    WriterIdentity,
};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// A local-first key/value store replicated through relays.
///
/// Writes are durable locally before they return and are published as one
/// encrypted snapshot after a quiet period. Remote snapshots are merged per
/// key, newest `last_modified` wins.
///
/// # Example
///
/// ```no_run
/// use snapsync_engine::{StoreOptions, SyncStore};
/// use serde_json::json;
///
/// # async fn demo() -> snapsync_engine::SyncResult<()> {
/// let store = SyncStore::open(StoreOptions::new("settings")).await?;
/// store.set("theme", json!("dark"))?;
/// assert_eq!(store.get("theme")?, Some(json!("dark")));
/// store.sync().await?;
/// store.close().await?;
/// # Ok(())
/// # }
/// ```
pub struct SyncStore {
    addressing: Addressing,
    writer: WriterIdentity,
    group_key: GroupKey,
    store: Arc<LocalSnapshotStore>,
    observers: Arc<Observers>,
    scheduler: SchedulerHandle,
    relays: Vec<Arc<dyn Relay>>,
    clock: Arc<dyn Clock>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl SyncStore {
    /// Opens a store: loads local state, subscribes on every relay and
    /// starts the publish scheduler.
    ///
    /// Must be called within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Configuration`] for invalid options (before any
    /// I/O), or a storage error if local state cannot be loaded.
    pub async fn open(options: StoreOptions) -> SyncResult<Self> {
        options.validate()?;

        let StoreOptions {
            namespace,
            writer,
            group_key,
            relays,
            debounce,
            retry,
            clock,
            backend,
            ..
        } = options;

        let store = Arc::new(LocalSnapshotStore::open(backend)?);
        let addressing = Addressing::new(namespace, group_key.topic());
        let cipher = Arc::new(SnapshotCipher::new(&group_key)?);
        let observers = Arc::new(Observers::default());

        let merger = Merger {
            store: Arc::clone(&store),
            observers: Arc::clone(&observers),
            cipher: Arc::clone(&cipher),
            addressing: addressing.clone(),
            writer: writer.id(),
        };
        let tasks = merger::spawn(merger, &relays).await;

        let publisher = Publisher {
            store: Arc::clone(&store),
            writer: writer.clone(),
            cipher,
            addressing: addressing.clone(),
            relays: relays.clone(),
            clock: Arc::clone(&clock),
        };
        let scheduler = SchedulerHandle::spawn(publisher, debounce, retry);

        info!(
            namespace = addressing.namespace(),
            writer = %writer.id(),
            relays = relays.len(),
            cursor = store.cursor(),
            "store opened"
        );

        Ok(Self {
            addressing,
            writer,
            group_key,
            store,
            observers,
            scheduler,
            relays,
            clock,
            tasks: Mutex::new(tasks),
            closed: AtomicBool::new(false),
        })
    }

    fn check_open(&self) -> SyncResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(SyncError::Closed)
        } else {
            Ok(())
        }
    }

    /// Returns the value for `key`, `None` if absent or deleted.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Closed`] after [`SyncStore::close`].
    pub fn get(&self, key: &str) -> SyncResult<Option<Value>> {
        self.check_open()?;
        Ok(self
            .store
            .get(key)
            .and_then(|entry| entry.live_value().cloned()))
    }

    /// Returns the value for `key` converted to `T`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Value`] if the stored value does not fit `T`.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> SyncResult<Option<T>> {
        self.get(key)?
            .map(serde_json::from_value)
            .transpose()
            .map_err(SyncError::from)
    }

    /// Stores `value` under `key`, stamped with the current time, and
    /// schedules a publish.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the write is not durable; nothing is
    /// scheduled in that case.
    pub fn set<V: Serialize>(&self, key: &str, value: V) -> SyncResult<()> {
        let value = serde_json::to_value(value)?;
        self.set_at(key, value, self.clock.now_millis())
    }

    /// Stores `value` under `key` with an explicit `last_modified`.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the write is not durable.
    pub fn set_at(&self, key: &str, value: Value, last_modified: u64) -> SyncResult<()> {
        self.check_open()?;
        self.store
            .set_entry(key, Entry::new(value, last_modified))?;
        self.scheduler.schedule();
        Ok(())
    }

    /// Deletes `key` by writing a tombstone.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the write is not durable.
    pub fn del(&self, key: &str) -> SyncResult<()> {
        self.set_at(key, Value::Null, self.clock.now_millis())
    }

    /// Registers `callback` for keys changed by remote snapshots.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Closed`] after [`SyncStore::close`].
    pub fn on_change<F>(&self, callback: F) -> SyncResult<ChangeSubscription>
    where
        F: Fn(&str, &Value) + Send + Sync + 'static,
    {
        self.check_open()?;
        Ok(self.observers.subscribe(Arc::new(callback)))
    }

    /// Resolves with the first `(key, value)` changed by the next remote
    /// snapshot that changes anything.
    pub fn on_change_once(&self) -> impl Future<Output = SyncResult<(String, Value)>> + Send + 'static {
        let waiter = self.observers.wait_change();
        async move { waiter.await.map_err(|_| SyncError::Closed) }
    }

    /// Resolves after the next remote snapshot has been merged.
    pub fn on_receive(&self) -> impl Future<Output = SyncResult<()>> + Send + 'static {
        let waiter = self.observers.wait_receive();
        async move { waiter.await.map_err(|_| SyncError::Closed) }
    }

    /// Waits for the publish cycle in flight. Resolves `true` at once when
    /// nothing is pending, `false` if the cycle gave up.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Closed`] if the store is or gets closed.
    pub async fn sync(&self) -> SyncResult<bool> {
        self.check_open()?;
        self.scheduler.sync().await
    }

    /// Stops publishing and merging and closes every relay.
    ///
    /// Pending waiters resolve with [`SyncError::Closed`]. Unpublished
    /// writes stay in the local store.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the final flush fails.
    pub async fn close(&self) -> SyncResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        self.scheduler.shutdown().await;
        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            task.abort();
            let _ = task.await;
        }
        self.observers.close();

        for relay in &self.relays {
            if let Err(e) = relay.close().await {
                warn!(relay = relay.url(), error = %e, "relay close failed");
            }
        }

        info!(namespace = self.addressing.namespace(), "store closed");
        self.store.flush()
    }

    /// Exports the writer and group secrets.
    pub fn keys(&self) -> ExportedKeys {
        ExportedKeys::new(&self.writer, &self.group_key)
    }

    /// Returns this writer's public id.
    pub fn writer_id(&self) -> WriterId {
        self.writer.id()
    }

    /// Returns the replica-group topic.
    pub fn group_topic(&self) -> GroupTopic {
        self.addressing.group_topic()
    }

    /// Returns the namespace.
    pub fn namespace(&self) -> &str {
        self.addressing.namespace()
    }

    /// Returns every entry, tombstones included.
    pub fn snapshot(&self) -> Snapshot {
        self.store.snapshot()
    }

    /// Returns the live keys.
    pub fn live_keys(&self) -> Vec<String> {
        self.store.keys()
    }

    /// Returns the persisted sync cursor, in seconds.
    pub fn cursor(&self) -> u64 {
        self.store.cursor()
    }

    /// Returns the publish scheduler phase.
    pub fn phase(&self) -> SyncPhase {
        self.scheduler.phase()
    }

    /// Returns true once [`SyncStore::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Drop for SyncStore {
    fn drop(&mut self) {
        self.scheduler.abort();
        for task in self.tasks.get_mut().drain(..) {
            task.abort();
        }
    }
}

impl std::fmt::Debug for SyncStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncStore")
            .field("namespace", &self.addressing.namespace())
            .field("writer", &self.writer.id())
            .field("phase", &self.phase())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
