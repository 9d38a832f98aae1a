//! Error types for the relay.

use snapsync_protocol::ProtocolError;
use thiserror::Error;

/// Result type for relay operations.
pub type RelayResult<T> = Result<T, RelayError>;

/// Reasons a relay refuses an event.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    /// The event failed id or signature verification.
    #[error("invalid event: {0}")]
    InvalidEvent(#[from] ProtocolError),

    /// An event with the same coordinate and an equal or newer timestamp is stored.
    #[error("duplicate: have event at {stored} for this coordinate, got {incoming}")]
    Stale {
        /// `created_at` of the stored event.
        stored: u64,
        /// `created_at` of the refused event.
        incoming: u64,
    },

    /// Content exceeds the configured limit.
    #[error("content too large: {size} > {max}")]
    ContentTooLarge {
        /// Content size.
        size: usize,
        /// Configured limit.
        max: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = RelayError::Stale {
            stored: 10,
            incoming: 10,
        };
        assert!(err.to_string().starts_with("duplicate"));

        let err = RelayError::from(ProtocolError::IdMismatch);
        assert_eq!(err.to_string(), "invalid event: event id does not match content");
    }
}
