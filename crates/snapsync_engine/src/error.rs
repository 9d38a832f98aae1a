//! Error types for the sync engine.

use snapsync_protocol::ProtocolError;
use snapsync_storage::StorageError;
use thiserror::Error;

/// Result type for sync store operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors returned by a sync store.
///
/// Publish and relay failures never appear here; they only show up as a
/// `false` result from [`crate::SyncStore::sync`].
#[derive(Error, Debug)]
pub enum SyncError {
    /// Invalid store options.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The local backend failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Local data could not be encoded or decoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// A value could not be converted to or from JSON.
    #[error("value error: {0}")]
    Value(#[from] serde_json::Error),

    /// The store has been closed.
    #[error("store closed")]
    Closed,
}

impl SyncError {
    /// Creates a storage codec error for a damaged local record.
    pub(crate) fn codec(message: impl Into<String>) -> Self {
        Self::Storage(StorageError::Codec(message.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = SyncError::Configuration("namespace must not be empty".into());
        assert_eq!(
            err.to_string(),
            "configuration error: namespace must not be empty"
        );
        assert_eq!(SyncError::Closed.to_string(), "store closed");
    }

    #[test]
    fn storage_errors_convert() {
        let err: SyncError = StorageError::Locked("db".into()).into();
        assert!(matches!(err, SyncError::Storage(StorageError::Locked(_))));

        let err = SyncError::codec("bad cbor");
        assert!(matches!(err, SyncError::Storage(StorageError::Codec(_))));
    }
}
