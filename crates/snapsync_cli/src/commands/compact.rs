//! Compact command implementation.

use std::path::Path;

/// Compaction statistics.
#[derive(Debug)]
pub struct CompactStats {
    /// Records before compaction.
    pub records_before: usize,
    /// Records after compaction.
    pub records_after: usize,
    /// Bytes before compaction.
    pub bytes_before: u64,
    /// Bytes after compaction.
    pub bytes_after: u64,
}

/// Rewrites the store file so it holds one record per key.
///
/// Tombstones are kept; dropping them would let older snapshots resurrect
/// deleted keys.
pub fn compact(path: &Path) -> Result<CompactStats, Box<dyn std::error::Error>> {
    let (backend, _store) = super::open_existing(path)?;
    let before = backend.stats();
    backend.compact()?;
    let after = backend.stats();

    Ok(CompactStats {
        records_before: before.record_count,
        records_after: after.record_count,
        bytes_before: before.file_size,
        bytes_after: after.file_size,
    })
}

/// Runs the compact command.
pub fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    println!("Compacting store at {:?}", path);
    println!();

    let stats = compact(path)?;

    println!("  Records:     {} -> {}", stats.records_before, stats.records_after);
    println!("  Size before: {} bytes", stats.bytes_before);
    println!("  Size after:  {} bytes", stats.bytes_after);
    println!(
        "  Space saved: {} bytes ({:.1}%)",
        stats.bytes_before - stats.bytes_after,
        if stats.bytes_before > 0 {
            ((stats.bytes_before - stats.bytes_after) as f64 / stats.bytes_before as f64) * 100.0
        } else {
            0.0
        }
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{edit, inspect};
    use tempfile::tempdir;

    #[test]
    fn keeps_latest_entries_and_tombstones() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.log");
        for n in 0..5 {
            edit::set(&path, "counter", &n.to_string()).unwrap();
        }
        edit::set(&path, "gone", "true").unwrap();
        edit::del(&path, "gone").unwrap();

        let stats = compact(&path).unwrap();
        assert_eq!(stats.records_before, 7);
        assert_eq!(stats.records_after, 2);
        assert!(stats.bytes_after < stats.bytes_before);

        let result = inspect::inspect(&path).unwrap();
        assert_eq!(result.live_count, 1);
        assert_eq!(result.tombstone_count, 1);
        assert_eq!(edit::read(&path, "counter").unwrap(), Some(serde_json::json!(4)));
    }
}
