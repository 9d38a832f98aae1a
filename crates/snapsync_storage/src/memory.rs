//! In-memory key/value backend for testing.

use crate::backend::{KvBackend, KvPair};
use crate::error::StorageResult;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

/// An in-memory key/value backend.
///
/// This backend stores all data in a `BTreeMap` and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Stores that don't need to survive a restart
///
/// Writes can be made to fail with [`InMemoryBackend::set_fail_writes`],
/// which lets tests exercise persistence-error paths.
///
/// # Example
///
/// ```rust
/// use snapsync_storage::{KvBackend, InMemoryBackend};
///
/// let backend = InMemoryBackend::new();
/// backend.put(b"a", b"1").unwrap();
/// backend.put(b"b", b"2").unwrap();
/// assert_eq!(backend.scan_prefix(b"").unwrap().len(), 2);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    data: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
    fail_writes: AtomicBool,
}

impl InMemoryBackend {
    /// Creates a new empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of keys held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Returns true if no key has been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Makes every following write fail with an I/O error (or succeed again).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> StorageResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::Other,
                "in-memory backend configured to fail writes",
            )
            .into());
        }
        Ok(())
    }
}

impl KvBackend for InMemoryBackend {
    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.data.read().get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> StorageResult<()> {
        self.check_writable()?;
        self.data.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn put_batch(&self, pairs: &[KvPair]) -> StorageResult<()> {
        self.check_writable()?;
        let mut data = self.data.write();
        for (key, value) in pairs {
            data.insert(key.clone(), value.clone());
        }
        Ok(())
    }

    fn scan_prefix(&self, prefix: &[u8]) -> StorageResult<Vec<KvPair>> {
        let data = self.data.read();
        Ok(data
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn flush(&self) -> StorageResult<()> {
        // Nothing is buffered
        Ok(())
    }
}
