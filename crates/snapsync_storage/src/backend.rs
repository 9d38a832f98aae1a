//! Key/value backend trait definition.

use crate::error::StorageResult;

/// A key/value pair as returned by [`KvBackend::scan_prefix`].
pub type KvPair = (Vec<u8>, Vec<u8>);

/// A low-level ordered key/value store.
///
/// Backends are **opaque blob stores**. The snapshot store above owns the
/// key layout and value encoding; backends only keep bytes.
///
/// # Invariants
///
/// - `put` is durable when it returns `Ok`
/// - `get` returns the most recent value written for a key
/// - `scan_prefix` returns pairs in ascending key order
/// - Backends must be `Send + Sync` for concurrent access
///
/// # Implementors
///
/// - [`super::InMemoryBackend`] - For testing
/// - [`super::FileBackend`] - For persistent storage
pub trait KvBackend: Send + Sync {
    /// Reads the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>>;

    /// Writes `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the write cannot be made durable.
    fn put(&self, key: &[u8], value: &[u8]) -> StorageResult<()>;

    /// Writes several pairs with a single durability barrier.
    ///
    /// The default implementation writes pairs one at a time.
    ///
    /// # Errors
    ///
    /// Returns the first error encountered. Pairs written before the
    /// failure stay written.
    fn put_batch(&self, pairs: &[KvPair]) -> StorageResult<()> {
        for (key, value) in pairs {
            self.put(key, value)?;
        }
        Ok(())
    }

    /// Returns every pair whose key starts with `prefix`, in key order.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn scan_prefix(&self, prefix: &[u8]) -> StorageResult<Vec<KvPair>>;

    /// Flushes pending writes to durable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush operation fails.
    fn flush(&self) -> StorageResult<()>;
}
