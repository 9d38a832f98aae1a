//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A record failed its checksum or had an invalid header.
    #[error("storage corrupted at offset {offset}: {reason}")]
    Corrupted {
        /// File offset of the bad record.
        offset: u64,
        /// What was wrong with it.
        reason: String,
    },

    /// Another process holds the store open.
    #[error("store is locked by another process: {0}")]
    Locked(String),

    /// A key or value is too large to be encoded in a record.
    #[error("record too large: {0} bytes")]
    RecordTooLarge(usize),

    /// A value could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(String),
}

impl StorageError {
    /// Creates a corruption error.
    pub fn corrupted(offset: u64, reason: impl Into<String>) -> Self {
        Self::Corrupted {
            offset,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = StorageError::corrupted(42, "crc mismatch");
        assert_eq!(
            err.to_string(),
            "storage corrupted at offset 42: crc mismatch"
        );

        let err = StorageError::RecordTooLarge(10);
        assert!(err.to_string().contains("10"));
    }
}
