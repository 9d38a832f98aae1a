//! # SnapSync Engine
//!
//! Local-first, multi-writer key/value store that replicates through
//! publish/subscribe relays.
//!
//! This crate provides:
//! - [`SyncStore`], the store handle (`get`/`set`/`del`, listeners, `sync`)
//! - A durable local snapshot store with a persisted sync cursor
//! - A publish scheduler (debounce, single-flight, retry with backoff)
//! - A receive merger (per-key last-write-wins, cursor catch-up)
//!
//! ## Architecture
//!
//! Every write lands in the local store first. After a quiet period the
//! scheduler seals the *whole* key space into one encrypted, signed event
//! and publishes it; each writer keeps a single live event per namespace at
//! a relay. Peers decrypt incoming snapshots and merge them key by key.
//!
//! ```text
//! set/del ─▶ local store ─▶ scheduler ─▶ sign + seal ─▶ relay.publish
//! relay.subscribe ─▶ merger ─▶ local store ─▶ on_change listeners
//! ```
//!
//! ## Key Invariants
//!
//! - A write is durable locally before `set`/`del` return
//! - At most one publish attempt is in flight per store
//! - A write made during an attempt is covered by a follow-up attempt
//! - Remote entries win only with a strictly greater `last_modified`
//! - The cursor never moves backwards
//! - Merging never triggers a publish

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod clock;
mod config;
mod error;
mod merger;
mod observers;
mod scheduler;
mod store;
mod sync_store;

pub use clock::{Clock, ManualClock, SystemClock, TokioClock};
pub use config::{RetryConfig, StoreOptions, DEFAULT_DEBOUNCE};
pub use error::{SyncError, SyncResult};
pub use observers::{ChangeCallback, ChangeSubscription};
pub use scheduler::SyncPhase;
pub use store::LocalSnapshotStore;
pub use sync_store::SyncStore;
