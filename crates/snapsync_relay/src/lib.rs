//! # SnapSync Relay
//!
//! In-process publish/subscribe relay for SnapSync.
//!
//! This crate provides:
//! - [`RelayHub`], the relay itself: an event table with replace semantics
//! - [`MemoryRelay`], one client connection to a hub, implementing
//!   [`snapsync_protocol::Relay`]
//!
//! Several stores (one per simulated device) connect to the same hub. Each
//! connection can be taken offline or told to reject publishes, which is how
//! tests exercise retry and catch-up paths.
//!
//! # Semantics
//!
//! - Events are verified (id and signature) before they are stored
//! - For each [`snapsync_protocol::ReplaceCoordinate`] only the newest event
//!   is kept; a replacement must have a strictly greater `created_at`
//! - A new subscription first receives every stored event matching its
//!   filter in `created_at` order, then live events
//!
//! # Example
//!
//! ```
//! use snapsync_relay::{RelayConfig, RelayHub};
//!
//! let hub = RelayHub::new(RelayConfig::new("mem://relay-1"));
//! let device_a = hub.connect();
//! let device_b = hub.connect();
//! assert_eq!(hub.connection_count(), 2);
//! # drop((device_a, device_b));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod connection;
mod error;
mod hub;
mod store;

pub use config::RelayConfig;
pub use connection::MemoryRelay;
pub use error::{RelayError, RelayResult};
pub use hub::RelayHub;
pub use store::{EventStore, Stored};
