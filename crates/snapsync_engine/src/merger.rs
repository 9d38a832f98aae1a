//! Receive merger: applies remote snapshots to the local store.

use crate::error::SyncResult;
use crate::observers::Observers;
use crate::store::LocalSnapshotStore;
use snapsync_protocol::{Addressing, Event, ProtocolError, Relay, SnapshotCipher, WriterId};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// What happened to one incoming event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    /// Published by this writer.
    Own,
    /// Addressed to another namespace.
    OtherNamespace,
    /// Failed verification or decryption.
    Discarded,
    /// Merged; `changed` keys won.
    Merged { changed: usize },
}

pub(crate) struct Merger {
    pub(crate) store: Arc<LocalSnapshotStore>,
    pub(crate) observers: Arc<Observers>,
    pub(crate) cipher: Arc<SnapshotCipher>,
    pub(crate) addressing: Addressing,
    pub(crate) writer: WriterId,
}

impl Merger {
    /// Processes one event. Never triggers a publish.
    ///
    /// # Errors
    ///
    /// Returns an error if the local store cannot be written or the event
    /// cannot be checked for a local reason.
    pub(crate) fn handle(&self, event: &Event) -> SyncResult<Outcome> {
        if event.author == self.writer {
            return Ok(Outcome::Own);
        }
        if !self.addressing.matches_namespace(&event.tags) {
            return Ok(Outcome::OtherNamespace);
        }
        if let Err(e) = event.verify() {
            return reject(event, e);
        }
        let remote = match self
            .cipher
            .open_snapshot(&event.content, self.addressing.namespace_topic())
        {
            Ok(remote) => remote,
            Err(e) => return reject(event, e),
        };

        self.store.advance_cursor(event.created_at)?;
        let changed = self.store.merge(remote)?;
        debug!(
            id = %event.id,
            created_at = event.created_at,
            changed = changed.len(),
            "remote snapshot merged"
        );

        self.observers.notify_changes(&changed);
        self.observers.notify_received();
        Ok(Outcome::Merged {
            changed: changed.len(),
        })
    }

    async fn run(self, mut events: mpsc::UnboundedReceiver<Event>) {
        while let Some(event) = events.recv().await {
            match self.handle(&event) {
                Ok(outcome) => trace!(id = %event.id, ?outcome, "event handled"),
                Err(e) => warn!(id = %event.id, error = %e, "failed to apply remote snapshot"),
            }
        }
    }
}

/// Damaged or foreign events are dropped; anything else is a local failure.
fn reject(event: &Event, error: ProtocolError) -> SyncResult<Outcome> {
    if error.is_discardable() {
        warn!(id = %event.id, author = %event.author, %error, "discarding event");
        Ok(Outcome::Discarded)
    } else {
        Err(error.into())
    }
}

/// Subscribes on every relay and spawns the merger plus one forwarding task
/// per subscription. Relays that fail to subscribe are skipped.
pub(crate) async fn spawn(merger: Merger, relays: &[Arc<dyn Relay>]) -> Vec<JoinHandle<()>> {
    let filter = merger.addressing.filter(merger.store.cursor());
    let (tx, rx) = mpsc::unbounded_channel();
    let mut tasks = Vec::with_capacity(relays.len() + 1);

    for relay in relays {
        match relay.subscribe(filter.clone()).await {
            Ok(mut subscription) => {
                debug!(relay = relay.url(), subscription = subscription.id(), "subscribed");
                let tx = tx.clone();
                tasks.push(tokio::spawn(async move {
                    while let Some(event) = subscription.recv().await {
                        if tx.send(event).is_err() {
                            break;
                        }
                    }
                }));
            }
            Err(e) => warn!(relay = relay.url(), error = %e, "subscribe failed, skipping relay"),
        }
    }

    tasks.push(tokio::spawn(merger.run(rx)));
    tasks
}
