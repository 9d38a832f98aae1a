//! Inspect command implementation.

use serde::Serialize;
use serde_json::Value;
use snapsync_storage::FileStats;
use std::path::Path;

/// Store inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Store file path.
    pub path: String,
    /// File size in bytes.
    pub file_size: u64,
    /// Records in the log, overwritten ones included.
    pub record_count: usize,
    /// Sync cursor in seconds.
    pub cursor: u64,
    /// Number of live keys.
    pub live_count: usize,
    /// Number of tombstones.
    pub tombstone_count: usize,
    /// Entries ordered by key.
    pub entries: Vec<EntryInfo>,
}

/// One entry of the store.
#[derive(Debug, Serialize)]
pub struct EntryInfo {
    /// User key.
    pub key: String,
    /// Value, `null` for a tombstone.
    pub value: Value,
    /// Write timestamp in milliseconds.
    pub last_modified: u64,
    /// Whether the entry is a tombstone.
    pub deleted: bool,
}

/// Collects the inspection result for the store at `path`.
pub fn inspect(path: &Path) -> Result<InspectResult, Box<dyn std::error::Error>> {
    let (backend, store) = super::open_existing(path)?;
    let FileStats {
        file_size,
        record_count,
        ..
    } = backend.stats();

    let entries: Vec<EntryInfo> = store
        .snapshot()
        .into_iter()
        .map(|(key, entry)| EntryInfo {
            deleted: entry.is_tombstone(),
            key,
            value: entry.value,
            last_modified: entry.last_modified,
        })
        .collect();
    let tombstone_count = entries.iter().filter(|e| e.deleted).count();

    Ok(InspectResult {
        path: path.display().to_string(),
        file_size,
        record_count,
        cursor: store.cursor(),
        live_count: entries.len() - tombstone_count,
        tombstone_count,
        entries,
    })
}

/// Runs the inspect command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let result = inspect(path)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

fn print_text_output(result: &InspectResult) {
    println!("SnapSync Store: {}", result.path);
    println!();
    println!("Storage:");
    println!("  File size:    {} bytes", result.file_size);
    println!("  Records:      {}", result.record_count);
    println!("  Cursor:       {}", result.cursor);
    println!();
    println!("Entries:");
    println!("  Live:         {}", result.live_count);
    println!("  Tombstones:   {}", result.tombstone_count);

    if !result.entries.is_empty() {
        println!();
        for entry in &result.entries {
            if entry.deleted {
                println!("  {} <deleted> @{}", entry.key, entry.last_modified);
            } else {
                println!("  {} = {} @{}", entry.key, entry.value, entry.last_modified);
            }
        }
    }
}
