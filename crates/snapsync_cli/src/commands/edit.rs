//! Get, set and del commands.
//!
//! Edits are stamped with the current time and land in the local store only.
//! They reach peers with the next publish of a store opened on this file.

use serde_json::Value;
use snapsync_protocol::Entry;
use std::path::Path;
use tracing::debug;

/// Returns the live value stored under `key`.
pub fn read(path: &Path, key: &str) -> Result<Option<Value>, Box<dyn std::error::Error>> {
    let (_, store) = super::open_existing(path)?;
    Ok(store.get(key).and_then(|entry| entry.live_value().cloned()))
}

/// Runs the get command.
pub fn get(path: &Path, key: &str) -> Result<(), Box<dyn std::error::Error>> {
    match read(path, key)? {
        Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
        None => return Err(format!("Key not found: {key}").into()),
    }
    Ok(())
}

/// Runs the set command. `json` must parse as a JSON value other than `null`.
pub fn set(path: &Path, key: &str, json: &str) -> Result<(), Box<dyn std::error::Error>> {
    let value: Value = serde_json::from_str(json)?;
    if value.is_null() {
        return Err("null is reserved for deletions; use del".into());
    }
    write(path, key, Entry::new(value, super::now_millis()))
}

/// Runs the del command.
pub fn del(path: &Path, key: &str) -> Result<(), Box<dyn std::error::Error>> {
    write(path, key, Entry::tombstone(super::now_millis()))
}

fn write(path: &Path, key: &str, entry: Entry) -> Result<(), Box<dyn std::error::Error>> {
    let (_, store) = super::open(path)?;
    debug!(key, last_modified = entry.last_modified, deleted = entry.is_tombstone(), "writing entry");
    store.set_entry(key, entry)?;
    store.flush()?;
    Ok(())
}
