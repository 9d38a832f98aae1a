//! Error types for protocol operations.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while encoding, signing or decrypting protocol data.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Canonical encoding failed.
    #[error("codec error: {0}")]
    Codec(String),

    /// Key material could not be parsed.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// The event id does not match its content.
    #[error("event id does not match content")]
    IdMismatch,

    /// The event signature does not verify against its author.
    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    /// Ciphertext was malformed or encrypted under another key.
    #[error("decryption failed: {0}")]
    Decryption(String),

    /// Decrypted content is not a valid snapshot.
    #[error("malformed snapshot: {0}")]
    MalformedSnapshot(String),
}

impl ProtocolError {
    /// Returns true for errors that mean "this event is not for us or is
    /// damaged" rather than a local bug.
    pub fn is_discardable(&self) -> bool {
        matches!(
            self,
            ProtocolError::IdMismatch
                | ProtocolError::InvalidSignature(_)
                | ProtocolError::Decryption(_)
                | ProtocolError::MalformedSnapshot(_)
        )
    }
}
