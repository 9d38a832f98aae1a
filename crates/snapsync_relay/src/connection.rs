//! A client connection to an in-process relay.

use crate::hub::RelayHub;
use async_trait::async_trait;
use snapsync_protocol::{Event, Filter, Relay, Subscription, TransportError, TransportResult};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug)]
pub(crate) struct ConnectionState {
    online: AtomicBool,
    closed: AtomicBool,
    reject_publishes: AtomicBool,
    publish_attempts: AtomicUsize,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self {
            online: AtomicBool::new(true),
            closed: AtomicBool::new(false),
            reject_publishes: AtomicBool::new(false),
            publish_attempts: AtomicUsize::new(0),
        }
    }
}

impl ConnectionState {
    pub(crate) fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst) && !self.closed.load(Ordering::SeqCst)
    }
}

/// One client connection to a [`RelayHub`].
///
/// Starts online. While offline, publishes and new subscriptions fail with
/// [`TransportError::Unreachable`] and live events are not delivered; coming
/// back online replays the stored events matching each open subscription.
#[derive(Debug)]
pub struct MemoryRelay {
    hub: RelayHub,
    id: u64,
    state: Arc<ConnectionState>,
}

impl MemoryRelay {
    pub(crate) fn new(hub: RelayHub, id: u64, state: Arc<ConnectionState>) -> Self {
        Self { hub, id, state }
    }

    /// Returns the hub-assigned connection id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Returns the hub this connection talks to.
    pub fn hub(&self) -> &RelayHub {
        &self.hub
    }

    /// Takes the connection offline or brings it back.
    pub fn set_online(&self, online: bool) {
        let was = self.state.online.swap(online, Ordering::SeqCst);
        if online && !was && !self.state.closed.load(Ordering::SeqCst) {
            debug!(url = %self.hub.url(), connection = self.id, "connection back online");
            self.hub.resync(self.id);
        }
    }

    /// Makes the relay refuse every publish on this connection.
    pub fn set_reject_publishes(&self, reject: bool) {
        self.state.reject_publishes.store(reject, Ordering::SeqCst);
    }

    /// Returns the number of publish calls made on this connection.
    pub fn publish_attempts(&self) -> usize {
        self.state.publish_attempts.load(Ordering::SeqCst)
    }

    fn check_reachable(&self) -> TransportResult<()> {
        if self.state.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        if !self.state.online.load(Ordering::SeqCst) {
            return Err(TransportError::unreachable(self.hub.url(), "offline"));
        }
        Ok(())
    }
}

#[async_trait]
impl Relay for MemoryRelay {
    fn url(&self) -> &str {
        self.hub.url()
    }

    async fn publish(&self, event: &Event) -> TransportResult<()> {
        self.state.publish_attempts.fetch_add(1, Ordering::SeqCst);
        self.check_reachable()?;
        if self.state.reject_publishes.load(Ordering::SeqCst) {
            return Err(TransportError::rejected(self.hub.url(), "blocked"));
        }
        self.hub
            .accept(event.clone())
            .map(|_| ())
            .map_err(|e| TransportError::rejected(self.hub.url(), e.to_string()))
    }

    async fn subscribe(&self, filter: Filter) -> TransportResult<Subscription> {
        self.check_reachable()?;
        Ok(self.hub.subscribe(self.id, filter))
    }

    async fn close(&self) -> TransportResult<()> {
        if !self.state.closed.swap(true, Ordering::SeqCst) {
            self.hub.disconnect(self.id);
        }
        Ok(())
    }
}
