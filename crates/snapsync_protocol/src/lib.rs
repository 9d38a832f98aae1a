//! # SnapSync Protocol
//!
//! Wire types, snapshot codec, identity and addressing for SnapSync.
//!
//! This crate provides:
//! - [`Entry`] and [`Snapshot`], the replicated data model
//! - [`WriterIdentity`] and [`GroupKey`], the two kinds of key material
//! - Topic and replace-coordinate derivation ([`Addressing`])
//! - [`SnapshotCipher`] for encrypting snapshot content
//! - Signed [`Event`]s and subscription [`Filter`]s
//! - The [`Relay`] trait implemented by pub/sub endpoints
//!
//! Apart from the [`Relay`] trait, this is a pure crate with no I/O.
//!
//! ## Key Invariants
//!
//! - An event id is the SHA-256 of its canonical CBOR body; the signature
//!   covers the id
//! - A writer has at most one live event per namespace at a relay: events
//!   with the same [`ReplaceCoordinate`] supersede each other by `created_at`
//! - Snapshot ciphertext is bound to its namespace topic

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod address;
mod cipher;
mod entry;
mod error;
mod event;
mod filter;
mod keys;
mod transport;

pub use address::{Addressing, ReplaceCoordinate};
pub use cipher::{SnapshotCipher, KEY_SIZE, NONCE_SIZE, TAG_SIZE};
pub use entry::{Entry, Snapshot};
pub use error::{ProtocolError, ProtocolResult};
pub use event::{Event, EventId, Tag, SNAPSHOT_KIND};
pub use filter::Filter;
pub use keys::{ExportedKeys, GroupKey, GroupTopic, WriterId, WriterIdentity};
pub use transport::{Relay, Subscription, TransportError, TransportResult};
