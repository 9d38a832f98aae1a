//! Change listeners and one-shot waiters.

use parking_lot::Mutex;
use serde_json::Value;
use snapsync_protocol::Entry;
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use tokio::sync::oneshot;
use tracing::warn;

/// Callback invoked with `(key, value)` for every key a remote snapshot
/// changed. Tombstones are reported as `Value::Null`.
pub type ChangeCallback = Arc<dyn Fn(&str, &Value) + Send + Sync>;

#[derive(Default)]
struct ObserverState {
    next_id: u64,
    callbacks: BTreeMap<u64, ChangeCallback>,
    change_waiters: Vec<oneshot::Sender<(String, Value)>>,
    receive_waiters: Vec<oneshot::Sender<()>>,
    closed: bool,
}

/// Registry of listeners shared by the store and the merger.
#[derive(Default)]
pub(crate) struct Observers {
    state: Mutex<ObserverState>,
}

impl Observers {
    pub(crate) fn subscribe(self: &Arc<Self>, callback: ChangeCallback) -> ChangeSubscription {
        let mut state = self.state.lock();
        let id = state.next_id;
        state.next_id += 1;
        state.callbacks.insert(id, callback);
        ChangeSubscription {
            id,
            observers: Arc::downgrade(self),
        }
    }

    fn unsubscribe(&self, id: u64) -> bool {
        self.state.lock().callbacks.remove(&id).is_some()
    }

    pub(crate) fn wait_change(&self) -> oneshot::Receiver<(String, Value)> {
        let (tx, rx) = oneshot::channel();
        let mut state = self.state.lock();
        if !state.closed {
            state.change_waiters.push(tx);
        }
        rx
    }

    pub(crate) fn wait_receive(&self) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        let mut state = self.state.lock();
        if !state.closed {
            state.receive_waiters.push(tx);
        }
        rx
    }

    /// Calls every listener for each changed entry. Callbacks run outside
    /// the registry lock, so they may register or unsubscribe listeners.
    pub(crate) fn notify_changes(&self, changed: &[(String, Entry)]) {
        let Some((first_key, first_entry)) = changed.first() else {
            return;
        };

        let (callbacks, waiters) = {
            let mut state = self.state.lock();
            let callbacks: Vec<ChangeCallback> = state.callbacks.values().cloned().collect();
            (callbacks, std::mem::take(&mut state.change_waiters))
        };

        for (key, entry) in changed {
            for callback in &callbacks {
                let result = catch_unwind(AssertUnwindSafe(|| callback(key, &entry.value)));
                if result.is_err() {
                    warn!(key = %key, "change listener panicked");
                }
            }
        }

        for waiter in waiters {
            let _ = waiter.send((first_key.clone(), first_entry.value.clone()));
        }
    }

    pub(crate) fn notify_received(&self) {
        let waiters = std::mem::take(&mut self.state.lock().receive_waiters);
        for waiter in waiters {
            let _ = waiter.send(());
        }
    }

    /// Drops every pending waiter and listener.
    pub(crate) fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        state.callbacks.clear();
        state.change_waiters.clear();
        state.receive_waiters.clear();
    }

    #[cfg(test)]
    fn listener_count(&self) -> usize {
        self.state.lock().callbacks.len()
    }
}

/// Handle to a registered change listener.
///
/// Dropping the handle keeps the listener registered; call
/// [`ChangeSubscription::unsubscribe`] to remove it.
#[derive(Debug)]
pub struct ChangeSubscription {
    id: u64,
    observers: Weak<Observers>,
}

impl ChangeSubscription {
    /// Removes the listener. Returns false if it was already gone.
    pub fn unsubscribe(self) -> bool {
        self.observers
            .upgrade()
            .is_some_and(|observers| observers.unsubscribe(self.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn changed(pairs: &[(&str, Value)]) -> Vec<(String, Entry)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), Entry::new(v.clone(), 1)))
            .collect()
    }

    #[test]
    fn listeners_see_every_change() {
        let observers = Arc::new(Observers::default());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _sub = observers.subscribe(Arc::new(move |k: &str, v: &Value| {
            sink.lock().push((k.to_string(), v.clone()));
        }));

        observers.notify_changes(&changed(&[("a", json!(1)), ("b", Value::Null)]));
        assert_eq!(
            *seen.lock(),
            vec![("a".to_string(), json!(1)), ("b".to_string(), Value::Null)]
        );
    }

    #[test]
    fn unsubscribe_removes_listener() {
        let observers = Arc::new(Observers::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let sub = observers.subscribe(Arc::new(move |_: &str, _: &Value| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        assert!(sub.unsubscribe());
        assert_eq!(observers.listener_count(), 0);
        observers.notify_changes(&changed(&[("a", json!(1))]));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn panicking_listener_is_isolated() {
        let observers = Arc::new(Observers::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let _bad = observers.subscribe(Arc::new(|_: &str, _: &Value| panic!("listener bug")));
        let _good = observers.subscribe(Arc::new(move |_: &str, _: &Value| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        observers.notify_changes(&changed(&[("a", json!(1)), ("b", json!(2))]));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn one_shot_waiters() {
        let observers = Arc::new(Observers::default());
        let change = observers.wait_change();
        let receive = observers.wait_receive();

        observers.notify_changes(&[]);
        observers.notify_changes(&changed(&[("x", json!("first")), ("y", json!(2))]));
        observers.notify_received();

        assert_eq!(change.await.unwrap(), ("x".to_string(), json!("first")));
        receive.await.unwrap();
    }

    #[tokio::test]
    async fn close_abandons_waiters() {
        let observers = Arc::new(Observers::default());
        let pending = observers.wait_change();
        observers.close();

        assert!(pending.await.is_err());
        assert!(observers.wait_receive().await.is_err());
    }
}
