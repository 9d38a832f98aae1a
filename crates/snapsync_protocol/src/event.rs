//! Signed wire events.

use crate::address::ReplaceCoordinate;
use crate::error::{ProtocolError, ProtocolResult};
use crate::keys::{WriterId, WriterIdentity};
use ed25519_dalek::Signature;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Event kind of a snapshot event: application-specific replaceable data.
pub const SNAPSHOT_KIND: u16 = 30078;

/// SHA-256 id of an event.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(#[serde(with = "hex")] [u8; 32]);

impl EventId {
    /// Returns the id bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventId({})", &hex::encode(self.0)[..10])
    }
}

/// An event tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "t", content = "v", rename_all = "snake_case")]
pub enum Tag {
    /// Hashed namespace topic, used for filtering.
    Namespace(String),
    /// Identifier that, together with kind and author, forms the replace coordinate.
    Replace(String),
    /// Replica-group topic, hex.
    Group(String),
}

/// A signed event as carried by relays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// SHA-256 over the canonical body.
    pub id: EventId,
    /// Publishing writer.
    pub author: WriterId,
    /// Unix time in seconds.
    pub created_at: u64,
    /// Event kind.
    pub kind: u16,
    /// Tags.
    pub tags: Vec<Tag>,
    /// Encrypted snapshot.
    #[serde(with = "hex")]
    pub content: Vec<u8>,
    /// Author's signature over `id`.
    pub sig: Signature,
}

#[derive(Serialize)]
struct IdBody<'a> {
    author: &'a WriterId,
    created_at: u64,
    kind: u16,
    tags: &'a [Tag],
    content: &'a [u8],
}

fn compute_id(
    author: &WriterId,
    created_at: u64,
    kind: u16,
    tags: &[Tag],
    content: &[u8],
) -> ProtocolResult<EventId> {
    let body = IdBody {
        author,
        created_at,
        kind,
        tags,
        content,
    };
    let mut buf = Vec::new();
    ciborium::ser::into_writer(&body, &mut buf).map_err(|e| ProtocolError::Codec(e.to_string()))?;
    Ok(EventId(Sha256::digest(&buf).into()))
}

impl Event {
    /// Builds and signs an event.
    ///
    /// # Errors
    ///
    /// Returns an error if the body cannot be encoded.
    pub fn sign(
        writer: &WriterIdentity,
        created_at: u64,
        kind: u16,
        tags: Vec<Tag>,
        content: Vec<u8>,
    ) -> ProtocolResult<Self> {
        let author = writer.id();
        let id = compute_id(&author, created_at, kind, &tags, &content)?;
        let sig = writer.sign(id.as_bytes());
        Ok(Self {
            id,
            author,
            created_at,
            kind,
            tags,
            content,
            sig,
        })
    }

    /// Checks that the id matches the body and the signature matches the author.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::IdMismatch`] or [`ProtocolError::InvalidSignature`].
    pub fn verify(&self) -> ProtocolResult<()> {
        let expected = compute_id(
            &self.author,
            self.created_at,
            self.kind,
            &self.tags,
            &self.content,
        )?;
        if expected != self.id {
            return Err(ProtocolError::IdMismatch);
        }
        self.author.verify(self.id.as_bytes(), &self.sig)
    }

    /// Returns the namespace topic tag, if any.
    pub fn namespace_topic(&self) -> Option<&str> {
        self.tags.iter().find_map(|t| match t {
            Tag::Namespace(topic) => Some(topic.as_str()),
            _ => None,
        })
    }

    /// Returns the group topic tag, if any.
    pub fn group_topic(&self) -> Option<&str> {
        self.tags.iter().find_map(|t| match t {
            Tag::Group(topic) => Some(topic.as_str()),
            _ => None,
        })
    }

    /// Returns the replace coordinate, if the event carries a replace tag.
    pub fn coordinate(&self) -> Option<ReplaceCoordinate> {
        self.tags.iter().find_map(|t| match t {
            Tag::Replace(identifier) => Some(ReplaceCoordinate {
                kind: self.kind,
                author: self.author,
                identifier: identifier.clone(),
            }),
            _ => None,
        })
    }
}
