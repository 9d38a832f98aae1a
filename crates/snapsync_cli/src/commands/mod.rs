//! CLI command implementations.

pub mod compact;
pub mod edit;
pub mod inspect;
pub mod keygen;

use snapsync_engine::{Clock, LocalSnapshotStore, SystemClock};
use snapsync_storage::FileBackend;
use std::path::Path;
use std::sync::Arc;

/// Opens an existing store file.
fn open_existing(
    path: &Path,
) -> Result<(Arc<FileBackend>, LocalSnapshotStore), Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(format!("No store found at {:?}", path).into());
    }
    open(path)
}

/// Opens a store file, creating it if missing.
fn open(path: &Path) -> Result<(Arc<FileBackend>, LocalSnapshotStore), Box<dyn std::error::Error>> {
    let backend = Arc::new(FileBackend::open_with_create_dirs(path)?);
    let store = LocalSnapshotStore::open(backend.clone())?;
    Ok((backend, store))
}

fn now_millis() -> u64 {
    SystemClock.now_millis()
}
