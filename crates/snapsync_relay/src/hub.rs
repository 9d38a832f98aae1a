//! The relay: event table plus subscriber fanout.

use crate::config::RelayConfig;
use crate::connection::{ConnectionState, MemoryRelay};
use crate::error::{RelayError, RelayResult};
use crate::store::{EventStore, Stored};
use parking_lot::Mutex;
use snapsync_protocol::{Event, Filter, Subscription};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, trace};

struct Subscriber {
    connection: u64,
    filter: Filter,
    sender: mpsc::UnboundedSender<Event>,
}

#[derive(Default)]
struct HubState {
    events: EventStore,
    subscribers: Vec<Subscriber>,
    connections: HashMap<u64, Arc<ConnectionState>>,
    next_connection: u64,
    next_subscription: u64,
}

struct HubInner {
    config: RelayConfig,
    state: Mutex<HubState>,
}

/// An in-process relay shared by any number of connections.
///
/// Cloning a hub yields another handle to the same relay.
#[derive(Clone)]
pub struct RelayHub {
    inner: Arc<HubInner>,
}

impl RelayHub {
    /// Creates an empty relay.
    pub fn new(config: RelayConfig) -> Self {
        Self {
            inner: Arc::new(HubInner {
                config,
                state: Mutex::new(HubState::default()),
            }),
        }
    }

    /// Returns the relay URL.
    pub fn url(&self) -> &str {
        &self.inner.config.url
    }

    /// Returns the relay configuration.
    pub fn config(&self) -> &RelayConfig {
        &self.inner.config
    }

    /// Opens a new client connection.
    pub fn connect(&self) -> MemoryRelay {
        let state = Arc::new(ConnectionState::default());
        let id = {
            let mut hub = self.inner.state.lock();
            let id = hub.next_connection;
            hub.next_connection += 1;
            hub.connections.insert(id, Arc::clone(&state));
            id
        };
        debug!(url = %self.url(), connection = id, "connection opened");
        MemoryRelay::new(self.clone(), id, state)
    }

    /// Returns the number of open connections.
    pub fn connection_count(&self) -> usize {
        self.inner.state.lock().connections.len()
    }

    /// Returns the number of stored events.
    pub fn event_count(&self) -> usize {
        self.inner.state.lock().events.len()
    }

    /// Returns stored events matching `filter`, oldest first.
    pub fn query(&self, filter: &Filter) -> Vec<Event> {
        self.inner.state.lock().events.query(filter)
    }

    /// Validates, stores and fans out an event.
    ///
    /// # Errors
    ///
    /// Returns an error if the event is oversized, fails verification, or
    /// is not newer than the stored event for its coordinate.
    pub fn accept(&self, event: Event) -> RelayResult<Stored> {
        let config = &self.inner.config;
        if let Some(max) = config.max_content_bytes {
            if event.content.len() > max {
                return Err(RelayError::ContentTooLarge {
                    size: event.content.len(),
                    max,
                });
            }
        }
        if config.verify_signatures {
            event.verify()?;
        }

        let mut hub = self.inner.state.lock();
        let stored = hub.events.insert(event.clone())?;

        let HubState {
            subscribers,
            connections,
            ..
        } = &mut *hub;
        subscribers.retain(|sub| {
            let online = connections
                .get(&sub.connection)
                .is_some_and(|c| c.is_online());
            if !online || !sub.filter.matches(&event) {
                return true;
            }
            sub.sender.send(event.clone()).is_ok()
        });

        trace!(url = %config.url, id = %event.id, created_at = event.created_at, "event stored");
        Ok(stored)
    }

    pub(crate) fn subscribe(&self, connection: u64, filter: Filter) -> Subscription {
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut hub = self.inner.state.lock();

        let id = hub.next_subscription;
        hub.next_subscription += 1;

        for event in self.backlog(&hub.events, &filter) {
            // The receiver is still in hand, so this cannot fail.
            let _ = sender.send(event);
        }
        hub.subscribers.push(Subscriber {
            connection,
            filter,
            sender,
        });

        debug!(url = %self.url(), connection, subscription = id, "subscription opened");
        Subscription::new(id, receiver)
    }

    /// Replays stored events to every subscription of a connection that
    /// just came back online, as a reconnecting client would re-request them.
    pub(crate) fn resync(&self, connection: u64) {
        let mut hub = self.inner.state.lock();
        let HubState {
            events,
            subscribers,
            ..
        } = &mut *hub;

        subscribers.retain(|sub| {
            if sub.connection != connection {
                return true;
            }
            self.backlog(events, &sub.filter)
                .into_iter()
                .all(|event| sub.sender.send(event).is_ok())
        });
    }

    pub(crate) fn disconnect(&self, connection: u64) {
        let mut hub = self.inner.state.lock();
        hub.connections.remove(&connection);
        hub.subscribers.retain(|sub| sub.connection != connection);
        debug!(url = %self.url(), connection, "connection closed");
    }

    fn backlog(&self, events: &EventStore, filter: &Filter) -> Vec<Event> {
        let mut matching = events.query(filter);
        if let Some(max) = self.inner.config.max_backlog {
            let skip = matching.len().saturating_sub(max);
            matching.drain(..skip);
        }
        matching
    }
}

impl std::fmt::Debug for RelayHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayHub")
            .field("url", &self.url())
            .field("events", &self.event_count())
            .finish()
    }
}
