//! Writer identities and replica-group keys.
//!
//! Both are Ed25519 keypairs. A [`WriterIdentity`] is private to one device
//! and signs the events it publishes. A [`GroupKey`] is shared out-of-band
//! between every device that should see the same data: its public half is
//! the addressing topic and its secret half seeds the snapshot cipher.

use crate::error::{ProtocolError, ProtocolResult};
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::fmt;

fn parse_secret(hex_str: &str) -> ProtocolResult<[u8; 32]> {
    let mut bytes = [0u8; 32];
    hex::decode_to_slice(hex_str.trim(), &mut bytes)
        .map_err(|e| ProtocolError::InvalidKey(format!("expected 64 hex chars: {e}")))?;
    Ok(bytes)
}

/// Signing identity of one writer.
#[derive(Clone)]
pub struct WriterIdentity {
    signing_key: SigningKey,
}

impl WriterIdentity {
    /// Creates a new identity with a random key.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Creates an identity from secret key bytes.
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(bytes),
        }
    }

    /// Parses an identity exported with [`WriterIdentity::to_hex`].
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidKey`] if the string is not 32 hex bytes.
    pub fn from_hex(hex_str: &str) -> ProtocolResult<Self> {
        Ok(Self::from_bytes(&parse_secret(hex_str)?))
    }

    /// Exports the secret key as hex.
    ///
    /// Treat the result like a password.
    pub fn to_hex(&self) -> String {
        hex::encode(self.signing_key.to_bytes())
    }

    /// Returns the public id of this writer.
    pub fn id(&self) -> WriterId {
        WriterId(self.signing_key.verifying_key().to_bytes())
    }

    /// Signs a message.
    pub fn sign(&self, msg: &[u8]) -> Signature {
        self.signing_key.sign(msg)
    }
}

impl fmt::Debug for WriterIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriterIdentity")
            .field("id", &self.id())
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// Public id of a writer: its Ed25519 verifying key.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WriterId(#[serde(with = "hex")] [u8; 32]);

impl WriterId {
    /// Wraps raw public key bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Returns the public key bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Strictly verifies `signature` over `msg`.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidSignature`] if the key is not a valid
    /// curve point or the signature does not match.
    pub fn verify(&self, msg: &[u8], signature: &Signature) -> ProtocolResult<()> {
        let key = VerifyingKey::from_bytes(&self.0)
            .map_err(|e| ProtocolError::InvalidSignature(e.to_string()))?;
        key.verify_strict(msg, signature)
            .map_err(|e| ProtocolError::InvalidSignature(e.to_string()))
    }
}

impl fmt::Display for WriterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for WriterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WriterId({})", &hex::encode(self.0)[..10])
    }
}

/// Keypair shared by all writers of one replica group.
#[derive(Clone)]
pub struct GroupKey {
    signing_key: SigningKey,
}

impl GroupKey {
    /// Creates a new group key at random.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Creates a group key from secret bytes.
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(bytes),
        }
    }

    /// Parses a group key exported with [`GroupKey::to_hex`].
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidKey`] if the string is not 32 hex bytes.
    pub fn from_hex(hex_str: &str) -> ProtocolResult<Self> {
        Ok(Self::from_bytes(&parse_secret(hex_str)?))
    }

    /// Exports the secret half as hex, for sharing with other devices.
    pub fn to_hex(&self) -> String {
        hex::encode(self.signing_key.to_bytes())
    }

    /// Returns the public addressing topic.
    pub fn topic(&self) -> GroupTopic {
        GroupTopic(self.signing_key.verifying_key().to_bytes())
    }

    pub(crate) fn secret_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }
}

impl fmt::Debug for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupKey")
            .field("topic", &self.topic())
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// Public half of a [`GroupKey`], used as the relay filter topic.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupTopic(#[serde(with = "hex")] [u8; 32]);

impl GroupTopic {
    /// Returns the topic bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for GroupTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for GroupTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GroupTopic({})", &hex::encode(self.0)[..10])
    }
}

/// Portable export of a store's key material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportedKeys {
    /// Writer secret key, hex.
    pub writer: String,
    /// Group secret key, hex.
    pub group: String,
}

impl ExportedKeys {
    /// Exports both keys.
    pub fn new(writer: &WriterIdentity, group: &GroupKey) -> Self {
        Self {
            writer: writer.to_hex(),
            group: group.to_hex(),
        }
    }

    /// Parses both keys back.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidKey`] if either key is malformed.
    pub fn parse(&self) -> ProtocolResult<(WriterIdentity, GroupKey)> {
        Ok((
            WriterIdentity::from_hex(&self.writer)?,
            GroupKey::from_hex(&self.group)?,
        ))
    }
}
