//! Persisted read-state fallback
//!
//! Holds the client-side `lastCheckedAt` timestamp: all messages dated at or
//! before that instant are considered read whenever the server-held per-
//! message flag is unavailable. The store is a minimal synchronous key-value
//! interface so hosts can back it with browser storage, a file, or memory.
//!
//! The timestamp only ever moves forward. It is created lazily on first
//! reconciliation and deleted only by the explicit reset operation.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::warn;

/// Fixed key under which `lastCheckedAt` is persisted
pub const LAST_CHECKED_KEY: &str = "portalInbox_lastCheckedComments";

/// Minimal synchronous key-value store
///
/// Mirrors the browser-persisted store of the original host: get/set/remove
/// under string keys. Implementations log and swallow their own I/O
/// failures; a missing or unreadable value simply reads as `None`.
pub trait ReadStateStore: Send + Sync {
    /// Read a value
    fn get(&self, key: &str) -> Option<String>;
    /// Write a value (last write wins; unguarded across processes)
    fn set(&self, key: &str, value: &str);
    /// Delete a value; ignores missing keys
    fn remove(&self, key: &str);
}

/// In-memory store for tests and non-browser hosts
#[derive(Debug, Default)]
pub struct MemoryReadStateStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryReadStateStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReadStateStore for MemoryReadStateStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(key.to_owned(), value.to_owned());
    }

    fn remove(&self, key: &str) {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(key);
    }
}

/// File-backed store persisting a flat JSON object
///
/// The whole map is rewritten on each set; concurrent writers are
/// last-write-wins, matching the original browser storage semantics.
#[derive(Debug)]
pub struct FileReadStateStore {
    path: PathBuf,
}

impl FileReadStateStore {
    /// Create a store backed by the given file (created on first write)
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn load(&self) -> HashMap<String, String> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!(path = %self.path.display(), error = %e, "read-state file is malformed; starting empty");
                HashMap::new()
            }),
            Err(_) => HashMap::new(),
        }
    }

    fn persist(&self, entries: &HashMap<String, String>) {
        let serialized = match serde_json::to_string(entries) {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "failed serializing read-state entries");
                return;
            }
        };
        if let Err(e) = std::fs::write(&self.path, serialized) {
            warn!(path = %self.path.display(), error = %e, "failed writing read-state file");
        }
    }
}

impl ReadStateStore for FileReadStateStore {
    fn get(&self, key: &str) -> Option<String> {
        self.load().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        let mut entries = self.load();
        entries.insert(key.to_owned(), value.to_owned());
        self.persist(&entries);
    }

    fn remove(&self, key: &str) {
        let mut entries = self.load();
        if entries.remove(key).is_some() {
            self.persist(&entries);
        }
    }
}

/// Load the persisted `lastCheckedAt`, defaulting to the Unix epoch
///
/// An unparseable stored value also reads as the epoch (and is logged), so a
/// corrupt entry degrades to "nothing read yet" rather than failing a load.
pub fn load_last_checked(store: &dyn ReadStateStore) -> DateTime<Utc> {
    let Some(raw) = store.get(LAST_CHECKED_KEY) else {
        return DateTime::<Utc>::UNIX_EPOCH;
    };
    match DateTime::parse_from_rfc3339(&raw) {
        Ok(parsed) => parsed.with_timezone(&Utc),
        Err(e) => {
            warn!(value = %raw, error = %e, "stored lastCheckedAt is malformed; treating as epoch");
            DateTime::<Utc>::UNIX_EPOCH
        }
    }
}

/// Advance `lastCheckedAt` to `candidate` if it moves forward
///
/// The timestamp is monotonically non-decreasing: a candidate at or before
/// the stored value leaves the store untouched. Returns the effective value.
pub fn advance_last_checked(store: &dyn ReadStateStore, candidate: DateTime<Utc>) -> DateTime<Utc> {
    let current = load_last_checked(store);
    if candidate > current {
        store.set(
            LAST_CHECKED_KEY,
            &candidate.to_rfc3339_opts(SecondsFormat::Millis, true),
        );
        candidate
    } else {
        current
    }
}

/// Delete the persisted entry (testing utility)
pub fn clear_last_checked(store: &dyn ReadStateStore) {
    store.remove(LAST_CHECKED_KEY);
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeZone, Utc};

    use super::{
        FileReadStateStore, MemoryReadStateStore, ReadStateStore, advance_last_checked,
        clear_last_checked, load_last_checked,
    };

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().expect("valid timestamp")
    }

    #[test]
    fn defaults_to_epoch_when_never_set() {
        let store = MemoryReadStateStore::new();
        assert_eq!(load_last_checked(&store), DateTime::<Utc>::UNIX_EPOCH);
    }

    #[test]
    fn advances_forward_but_never_backward() {
        let store = MemoryReadStateStore::new();
        assert_eq!(advance_last_checked(&store, at(1_000)), at(1_000));
        assert_eq!(advance_last_checked(&store, at(500)), at(1_000));
        assert_eq!(load_last_checked(&store), at(1_000));
        assert_eq!(advance_last_checked(&store, at(2_000)), at(2_000));
    }

    #[test]
    fn clear_resets_to_epoch() {
        let store = MemoryReadStateStore::new();
        advance_last_checked(&store, at(1_000));
        clear_last_checked(&store);
        assert_eq!(load_last_checked(&store), DateTime::<Utc>::UNIX_EPOCH);
    }

    #[test]
    fn file_store_round_trips_across_instances() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("read-state.json");

        let store = FileReadStateStore::new(&path);
        advance_last_checked(&store, at(1_234));

        let reopened = FileReadStateStore::new(&path);
        assert_eq!(load_last_checked(&reopened), at(1_234));
    }

    #[test]
    fn malformed_stored_value_reads_as_epoch() {
        let store = MemoryReadStateStore::new();
        store.set(super::LAST_CHECKED_KEY, "not a timestamp");
        assert_eq!(load_last_checked(&store), DateTime::<Utc>::UNIX_EPOCH);
    }
}
