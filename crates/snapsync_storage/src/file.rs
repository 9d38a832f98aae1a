//! File-based key/value backend.
//!
//! The file is an append-only log of records. Opening the file replays the
//! log into an in-memory index; every `put` appends a record and syncs it
//! before returning.
//!
//! ## Record Format
//!
//! | magic (4) | key len (4) | value len (4) | key (K) | value (V) | crc32 (4) |
//!
//! All integers are little-endian. The CRC covers everything before it.
//!
//! ## Recovery
//!
//! - **Torn tail**: an incomplete or checksum-failing *final* record is a
//!   write interrupted by a crash; the file is truncated back to the last
//!   complete record.
//! - **Bad record in the middle**: returns [`StorageError::Corrupted`].

use crate::backend::{KvBackend, KvPair};
use crate::error::{StorageError, StorageResult};
use fs2::FileExt;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Magic bytes at the start of every record.
pub const RECORD_MAGIC: [u8; 4] = *b"SSKR";

const HEADER_SIZE: usize = 12;
const CRC_SIZE: usize = 4;

/// Size statistics for a [`FileBackend`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStats {
    /// Size of the log file in bytes.
    pub file_size: u64,
    /// Number of records in the log, including overwritten ones.
    pub record_count: usize,
    /// Number of distinct keys.
    pub live_keys: usize,
}

struct FileState {
    file: File,
    index: BTreeMap<Vec<u8>, Vec<u8>>,
    size: u64,
    record_count: usize,
}

/// A file-based key/value backend.
///
/// # Durability
///
/// `put` and `put_batch` call `File::sync_data()` before returning.
///
/// # Locking
///
/// The file is locked exclusively while open; a second `open` of the same
/// path fails with [`StorageError::Locked`].
///
/// # Example
///
/// ```no_run
/// use snapsync_storage::{FileBackend, KvBackend};
/// use std::path::Path;
///
/// let backend = FileBackend::open(Path::new("store.log")).unwrap();
/// backend.put(b"e/color", b"blue").unwrap();
/// ```
pub struct FileBackend {
    path: PathBuf,
    state: Mutex<FileState>,
}

impl std::fmt::Debug for FileBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileBackend")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl FileBackend {
    /// Opens or creates a backend at the given path and replays its log.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened, is locked by another
    /// process, or contains a corrupted record before its final one.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        if file.try_lock_exclusive().is_err() {
            return Err(StorageError::Locked(path.display().to_string()));
        }

        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;

        let (index, valid_len, record_count) = replay(&bytes)?;
        if valid_len < bytes.len() as u64 {
            file.set_len(valid_len)?;
            file.sync_all()?;
        }

        Ok(Self {
            path: path.to_path_buf(),
            state: Mutex::new(FileState {
                file,
                index,
                size: valid_len,
                record_count,
            }),
        })
    }

    /// Opens or creates a backend, creating parent directories if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if directories cannot be created or the file cannot be opened.
    pub fn open_with_create_dirs(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::open(path)
    }

    /// Returns the path to the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns size statistics.
    #[must_use]
    pub fn stats(&self) -> FileStats {
        let state = self.state.lock();
        FileStats {
            file_size: state.size,
            record_count: state.record_count,
            live_keys: state.index.len(),
        }
    }

    /// Rewrites the log so it holds one record per key.
    ///
    /// Returns the number of bytes reclaimed.
    ///
    /// # Errors
    ///
    /// Returns an error if the rewritten log cannot be written or swapped in.
    pub fn compact(&self) -> StorageResult<u64> {
        let mut state = self.state.lock();

        let mut buf = Vec::new();
        for (key, value) in &state.index {
            encode_record(key, value, &mut buf)?;
        }

        // The rewritten log is locked before it replaces the old one, so the
        // handle kept below always owns the file at `self.path`.
        let tmp_path = self.path.with_extension("compact");
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&tmp_path)?;
        if file.try_lock_exclusive().is_err() {
            return Err(StorageError::Locked(tmp_path.display().to_string()));
        }
        file.set_len(0)?;
        file.write_all(&buf)?;
        file.sync_all()?;
        std::fs::rename(&tmp_path, &self.path)?;

        let reclaimed = state.size.saturating_sub(buf.len() as u64);
        state.file = file;
        state.size = buf.len() as u64;
        state.record_count = state.index.len();
        Ok(reclaimed)
    }

    fn append(&self, pairs: &[KvPair]) -> StorageResult<()> {
        let mut buf = Vec::new();
        for (key, value) in pairs {
            encode_record(key, value, &mut buf)?;
        }

        let mut state = self.state.lock();
        let offset = state.size;
        state.file.seek(SeekFrom::Start(offset))?;
        state.file.write_all(&buf)?;
        state.file.sync_data()?;

        state.size += buf.len() as u64;
        state.record_count += pairs.len();
        for (key, value) in pairs {
            state.index.insert(key.clone(), value.clone());
        }
        Ok(())
    }
}

impl KvBackend for FileBackend {
    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.state.lock().index.get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> StorageResult<()> {
        self.append(&[(key.to_vec(), value.to_vec())])
    }

    fn put_batch(&self, pairs: &[KvPair]) -> StorageResult<()> {
        if pairs.is_empty() {
            return Ok(());
        }
        self.append(pairs)
    }

    fn scan_prefix(&self, prefix: &[u8]) -> StorageResult<Vec<KvPair>> {
        let state = self.state.lock();
        Ok(state
            .index
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn flush(&self) -> StorageResult<()> {
        let mut state = self.state.lock();
        state.file.flush()?;
        state.file.sync_all()?;
        Ok(())
    }
}

fn encode_record(key: &[u8], value: &[u8], out: &mut Vec<u8>) -> StorageResult<()> {
    let key_len = u32::try_from(key.len()).map_err(|_| StorageError::RecordTooLarge(key.len()))?;
    let value_len =
        u32::try_from(value.len()).map_err(|_| StorageError::RecordTooLarge(value.len()))?;

    let start = out.len();
    out.extend_from_slice(&RECORD_MAGIC);
    out.extend_from_slice(&key_len.to_le_bytes());
    out.extend_from_slice(&value_len.to_le_bytes());
    out.extend_from_slice(key);
    out.extend_from_slice(value);
    let crc = crc32fast::hash(&out[start..]);
    out.extend_from_slice(&crc.to_le_bytes());
    Ok(())
}

/// Replays a record log. Returns the index, the length of the valid prefix
/// and the number of records in it.
fn replay(bytes: &[u8]) -> StorageResult<(BTreeMap<Vec<u8>, Vec<u8>>, u64, usize)> {
    let mut index = BTreeMap::new();
    let mut offset = 0usize;
    let mut count = 0usize;

    while offset < bytes.len() {
        let rest = &bytes[offset..];
        if rest.len() < HEADER_SIZE {
            break;
        }
        if rest[..4] != RECORD_MAGIC {
            return Err(StorageError::corrupted(offset as u64, "bad record magic"));
        }

        let key_len = u32::from_le_bytes([rest[4], rest[5], rest[6], rest[7]]) as usize;
        let value_len = u32::from_le_bytes([rest[8], rest[9], rest[10], rest[11]]) as usize;
        let body_end = HEADER_SIZE + key_len + value_len;
        let record_len = body_end + CRC_SIZE;
        if rest.len() < record_len {
            break;
        }

        let stored = u32::from_le_bytes([
            rest[body_end],
            rest[body_end + 1],
            rest[body_end + 2],
            rest[body_end + 3],
        ]);
        if crc32fast::hash(&rest[..body_end]) != stored {
            if offset + record_len == bytes.len() {
                break;
            }
            return Err(StorageError::corrupted(offset as u64, "crc mismatch"));
        }

        let key = rest[HEADER_SIZE..HEADER_SIZE + key_len].to_vec();
        let value = rest[HEADER_SIZE + key_len..body_end].to_vec();
        index.insert(key, value);
        offset += record_len;
        count += 1;
    }

    Ok((index, offset as u64, count))
}
