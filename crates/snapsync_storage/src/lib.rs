//! # SnapSync Storage
//!
//! Key/value backend trait and implementations for SnapSync.
//!
//! This crate provides the lowest-level storage abstraction used by the
//! local snapshot store. Backends are **opaque ordered blob stores** - they
//! map byte keys to byte values and know nothing about entries, cursors or
//! snapshots.
//!
//! ## Design Principles
//!
//! - Backends are simple ordered maps (get, put, prefix scan, flush)
//! - A successful `put` is durable before it returns
//! - Keys are never removed; values are only overwritten
//! - Must be `Send + Sync` so one store can be shared between tasks
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - For testing and ephemeral stores
//! - [`FileBackend`] - Append-only record log, replayed on open
//!
//! ## Example
//!
//! ```rust
//! use snapsync_storage::{KvBackend, InMemoryBackend};
//!
//! let backend = InMemoryBackend::new();
//! backend.put(b"e/color", b"\"blue\"").unwrap();
//! assert_eq!(backend.get(b"e/color").unwrap(), Some(b"\"blue\"".to_vec()));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::{KvBackend, KvPair};
pub use error::{StorageError, StorageResult};
pub use file::{FileBackend, FileStats, RECORD_MAGIC};
pub use memory::InMemoryBackend;
