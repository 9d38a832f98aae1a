//! Relay transport abstraction.

use crate::event::Event;
use crate::filter::Filter;
use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

/// Result type for relay operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Errors reported by a relay endpoint.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The endpoint could not be reached.
    #[error("relay {url} unreachable: {reason}")]
    Unreachable {
        /// Endpoint URL.
        url: String,
        /// Error message.
        reason: String,
    },

    /// The endpoint refused the event.
    #[error("relay {url} rejected event: {reason}")]
    Rejected {
        /// Endpoint URL.
        url: String,
        /// Rejection reason.
        reason: String,
    },

    /// The endpoint was closed by the client.
    #[error("relay connection closed")]
    Closed,
}

impl TransportError {
    /// Creates an unreachable error.
    pub fn unreachable(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unreachable {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Creates a rejection error.
    pub fn rejected(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Rejected {
            url: url.into(),
            reason: reason.into(),
        }
    }
}

/// A live subscription: stored events matching the filter first, then new
/// ones as they are published.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    receiver: mpsc::UnboundedReceiver<Event>,
}

impl Subscription {
    /// Wraps a receiver fed by the relay.
    pub fn new(id: u64, receiver: mpsc::UnboundedReceiver<Event>) -> Self {
        Self { id, receiver }
    }

    /// Returns the relay-assigned subscription id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Waits for the next event. Returns `None` once the relay has dropped
    /// the subscription.
    pub async fn recv(&mut self) -> Option<Event> {
        self.receiver.recv().await
    }

    /// Returns the next already-delivered event without waiting.
    pub fn try_recv(&mut self) -> Option<Event> {
        self.receiver.try_recv().ok()
    }
}

/// One publish/subscribe endpoint.
///
/// This trait abstracts the network layer, allowing for different
/// implementations (websocket clients, the in-process relay used in tests).
/// Implementations are expected to verify event signatures and to keep
/// only the newest event per [`crate::ReplaceCoordinate`].
#[async_trait]
pub trait Relay: Send + Sync {
    /// Returns the endpoint URL, for logging.
    fn url(&self) -> &str;

    /// Publishes an event. `Ok` means the endpoint acknowledged and stored it.
    async fn publish(&self, event: &Event) -> TransportResult<()>;

    /// Opens a subscription.
    async fn subscribe(&self, filter: Filter) -> TransportResult<Subscription>;

    /// Releases the connection. Open subscriptions end.
    async fn close(&self) -> TransportResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::WriterIdentity;

    #[test]
    fn error_display() {
        let err = TransportError::unreachable("mem://a", "offline");
        assert_eq!(err.to_string(), "relay mem://a unreachable: offline");

        let err = TransportError::rejected("mem://a", "duplicate");
        assert!(err.to_string().contains("duplicate"));
    }

    #[tokio::test]
    async fn subscription_yields_then_ends() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut sub = Subscription::new(7, rx);
        assert_eq!(sub.id(), 7);

        let event = Event::sign(&WriterIdentity::generate(), 1, 1, vec![], vec![]).unwrap();
        tx.send(event.clone()).unwrap();
        drop(tx);

        assert_eq!(sub.recv().await, Some(event));
        assert_eq!(sub.recv().await, None);
    }
}
