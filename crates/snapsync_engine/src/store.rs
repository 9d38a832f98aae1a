//! Local snapshot store.
//!
//! Entries and the sync cursor live in a [`KvBackend`] under separate key
//! prefixes, so a user key can never collide with bookkeeping data:
//!
//! ```text
//! e/<key>      CBOR-encoded Entry
//! m/cursor     u64 big-endian, seconds
//! ```
//!
//! An in-memory copy is loaded on open and only updated after the backend
//! write succeeds.

use crate::error::{SyncError, SyncResult};
use parking_lot::Mutex;
use snapsync_protocol::{Entry, Snapshot};
use snapsync_storage::{KvBackend, KvPair};
use std::sync::Arc;
use tracing::trace;

const ENTRY_PREFIX: &[u8] = b"e/";
const CURSOR_KEY: &[u8] = b"m/cursor";

struct StoreState {
    entries: Snapshot,
    cursor: u64,
}

/// Durable key to entry map plus the persisted sync cursor.
pub struct LocalSnapshotStore {
    backend: Arc<dyn KvBackend>,
    state: Mutex<StoreState>,
}

impl LocalSnapshotStore {
    /// Loads the store from `backend`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read or holds a record that
    /// does not decode.
    pub fn open(backend: Arc<dyn KvBackend>) -> SyncResult<Self> {
        let mut entries = Snapshot::new();
        for (raw_key, raw_value) in backend.scan_prefix(ENTRY_PREFIX)? {
            let key = String::from_utf8(raw_key[ENTRY_PREFIX.len()..].to_vec())
                .map_err(|e| SyncError::codec(format!("entry key: {e}")))?;
            entries.insert(key, decode_entry(&raw_value)?);
        }

        let cursor = match backend.get(CURSOR_KEY)? {
            Some(bytes) => {
                let bytes: [u8; 8] = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| SyncError::codec("cursor record is not 8 bytes"))?;
                u64::from_be_bytes(bytes)
            }
            None => 0,
        };

        trace!(entries = entries.len(), cursor, "local store loaded");
        Ok(Self {
            backend,
            state: Mutex::new(StoreState { entries, cursor }),
        })
    }

    /// Returns the entry for `key`, tombstones included.
    pub fn get(&self, key: &str) -> Option<Entry> {
        self.state.lock().entries.get(key).cloned()
    }

    /// Writes an entry. Returns once the backend has made it durable.
    ///
    /// # Errors
    ///
    /// Returns the backend error unchanged; the entry is not applied.
    pub fn set_entry(&self, key: &str, entry: Entry) -> SyncResult<()> {
        let mut state = self.state.lock();
        self.backend.put(&entry_key(key), &encode_entry(&entry)?)?;
        state.entries.insert(key.to_string(), entry);
        Ok(())
    }

    /// Returns every entry, tombstones included. Bookkeeping is excluded.
    pub fn snapshot(&self) -> Snapshot {
        self.state.lock().entries.clone()
    }

    /// Returns the live keys, in order.
    pub fn keys(&self) -> Vec<String> {
        self.state
            .lock()
            .entries
            .iter()
            .filter(|(_, entry)| !entry.is_tombstone())
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Returns the cursor: the newest remote `created_at` processed.
    pub fn cursor(&self) -> u64 {
        self.state.lock().cursor
    }

    /// Moves the cursor forward to `created_at`. Never moves it back.
    ///
    /// Returns true if the cursor changed.
    ///
    /// # Errors
    ///
    /// Returns the backend error unchanged.
    pub fn advance_cursor(&self, created_at: u64) -> SyncResult<bool> {
        let mut state = self.state.lock();
        if created_at <= state.cursor {
            return Ok(false);
        }
        self.backend.put(CURSOR_KEY, &created_at.to_be_bytes())?;
        state.cursor = created_at;
        Ok(true)
    }

    /// Applies a remote snapshot with last-write-wins per key.
    ///
    /// Returns the entries that replaced local ones, in key order. All
    /// winning entries are written with one batch.
    ///
    /// # Errors
    ///
    /// Returns the backend error unchanged; no entry is applied in memory.
    pub fn merge(&self, remote: Snapshot) -> SyncResult<Vec<(String, Entry)>> {
        let mut state = self.state.lock();

        let winners: Vec<(String, Entry)> = remote
            .into_iter()
            .filter(|(key, entry)| entry.supersedes(state.entries.get(key)))
            .collect();
        if winners.is_empty() {
            return Ok(winners);
        }

        let batch = winners
            .iter()
            .map(|(key, entry)| Ok((entry_key(key), encode_entry(entry)?)))
            .collect::<SyncResult<Vec<KvPair>>>()?;
        self.backend.put_batch(&batch)?;

        for (key, entry) in &winners {
            state.entries.insert(key.clone(), entry.clone());
        }
        Ok(winners)
    }

    /// Flushes the backend.
    ///
    /// # Errors
    ///
    /// Returns the backend error unchanged.
    pub fn flush(&self) -> SyncResult<()> {
        Ok(self.backend.flush()?)
    }
}

impl std::fmt::Debug for LocalSnapshotStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("LocalSnapshotStore")
            .field("entries", &state.entries.len())
            .field("cursor", &state.cursor)
            .finish()
    }
}

fn entry_key(key: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(ENTRY_PREFIX.len() + key.len());
    out.extend_from_slice(ENTRY_PREFIX);
    out.extend_from_slice(key.as_bytes());
    out
}

fn encode_entry(entry: &Entry) -> SyncResult<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::ser::into_writer(entry, &mut buf)
        .map_err(|e| SyncError::codec(format!("encode entry: {e}")))?;
    Ok(buf)
}

fn decode_entry(bytes: &[u8]) -> SyncResult<Entry> {
    ciborium::de::from_reader(bytes).map_err(|e| SyncError::codec(format!("decode entry: {e}")))
}
