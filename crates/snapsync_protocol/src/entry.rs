//! Replicated entries and snapshots.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A writer's full key space for one namespace.
pub type Snapshot = BTreeMap<String, Entry>;

/// The replicated state of one key.
///
/// A `null` value is a tombstone. Entries are never removed; a deletion is
/// an entry with a null value and a newer `last_modified`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    /// The stored value, `Value::Null` for a tombstone.
    pub value: Value,
    /// Wall-clock time of the write in milliseconds since the Unix epoch.
    pub last_modified: u64,
}

impl Entry {
    /// Creates an entry.
    pub fn new(value: Value, last_modified: u64) -> Self {
        Self {
            value,
            last_modified,
        }
    }

    /// Creates a tombstone.
    pub fn tombstone(last_modified: u64) -> Self {
        Self::new(Value::Null, last_modified)
    }

    /// Returns true if this entry records a deletion.
    pub fn is_tombstone(&self) -> bool {
        self.value.is_null()
    }

    /// Returns the live value, `None` for a tombstone.
    pub fn live_value(&self) -> Option<&Value> {
        if self.is_tombstone() {
            None
        } else {
            Some(&self.value)
        }
    }

    /// Last-write-wins: returns true if `self` replaces `local`.
    ///
    /// A missing local entry is older than everything. Equal timestamps keep
    /// the local entry.
    pub fn supersedes(&self, local: Option<&Entry>) -> bool {
        match local {
            None => true,
            Some(local) => self.last_modified > local.last_modified,
        }
    }
}
