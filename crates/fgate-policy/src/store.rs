//! Durable Policy Store
//!
//! Holds the single persisted record `{userId, blockedDomains,
//! lastSyncTime}` and the in-memory snapshot read by the request gate.
//!
//! Consistency model:
//! - Writes persist to disk (temp file + rename) before the in-memory
//!   pointer swap, so a failed write leaves both views untouched
//! - Readers clone an `Arc<Snapshot>` and can never observe a torn record
//! - A missing or corrupt record degrades to the zero snapshot

use crate::snapshot::Snapshot;
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors from durable writes. Reads never fail; they degrade.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Single source of truth for policy state.
pub struct PolicyStore {
    /// Backing file; `None` keeps the store in memory only
    path: Option<PathBuf>,
    /// Current snapshot, swapped wholesale on commit
    current: RwLock<Arc<Snapshot>>,
}

impl PolicyStore {
    /// Open the store at `path`, loading the last persisted record.
    ///
    /// Never fails: a missing or unreadable record becomes the zero
    /// snapshot (empty set, `last_sync_time = 0`, no user).
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let snapshot = load_record(&path);
        Self {
            path: Some(path),
            current: RwLock::new(Arc::new(snapshot)),
        }
    }

    /// Create a store with no backing file.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            current: RwLock::new(Arc::new(Snapshot::default())),
        }
    }

    /// Default record location under the platform data directory.
    pub fn default_location() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("focusgate")
            .join("policy.json")
    }

    /// Read accessor for the current snapshot.
    ///
    /// Cheap enough for the per-request hot path: the lock is held only
    /// for the `Arc` clone.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.current.read().unwrap().clone()
    }

    /// Atomically replace the blocked domains and last sync time,
    /// preserving the user identifier.
    pub fn commit(&self, domains: HashSet<String>, timestamp: u64) -> Result<(), StoreError> {
        let next = Snapshot {
            user_id: self.snapshot().user_id.clone(),
            blocked_domains: domains,
            last_sync_time: timestamp,
        };
        self.persist(&next)?;

        debug!(
            "Committed snapshot: {} domains (sync time {})",
            next.blocked_domains.len(),
            next.last_sync_time
        );
        *self.current.write().unwrap() = Arc::new(next);
        Ok(())
    }

    /// Replace the user identifier. Does not trigger a sync; the sync
    /// engine decides that.
    pub fn set_user_id(&self, user_id: Option<String>) -> Result<(), StoreError> {
        let next = Snapshot {
            user_id,
            ..(*self.snapshot()).clone()
        };
        self.persist(&next)?;

        match &next.user_id {
            Some(id) => info!("User identifier set ({} chars)", id.len()),
            None => info!("User identifier cleared, sync disabled"),
        }
        *self.current.write().unwrap() = Arc::new(next);
        Ok(())
    }

    /// Write the record durably: temp file in the same directory, then
    /// rename over the target.
    fn persist(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let data = serde_json::to_vec_pretty(snapshot)?;
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, &data)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

/// Load the persisted record, degrading to the zero snapshot on any error.
fn load_record(path: &Path) -> Snapshot {
    let data = match fs::read_to_string(path) {
        Ok(data) => data,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("No policy record at {}, starting empty", path.display());
            return Snapshot::default();
        }
        Err(e) => {
            warn!("Failed to read policy record {}: {}", path.display(), e);
            return Snapshot::default();
        }
    };

    match serde_json::from_str::<Snapshot>(&data) {
        Ok(snapshot) => {
            debug!(
                "Loaded policy record: {} domains, last sync {}",
                snapshot.blocked_domains.len(),
                snapshot.last_sync_time
            );
            snapshot
        }
        Err(e) => {
            warn!("Corrupt policy record {}: {}", path.display(), e);
            Snapshot::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_record(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("fgate-store-{}-{}", std::process::id(), name))
            .join("policy.json")
    }

    fn cleanup(path: &Path) {
        if let Some(dir) = path.parent() {
            let _ = fs::remove_dir_all(dir);
        }
    }

    fn domains(names: &[&str]) -> HashSet<String> {
        names.iter().map(|d| d.to_string()).collect()
    }

    #[test]
    fn test_open_missing_record() {
        let path = temp_record("missing");
        let store = PolicyStore::open(&path);

        assert_eq!(*store.snapshot(), Snapshot::default());
        cleanup(&path);
    }

    #[test]
    fn test_commit_and_reload() {
        let path = temp_record("reload");

        {
            let store = PolicyStore::open(&path);
            store.set_user_id(Some("user-1".to_string())).unwrap();
            store
                .commit(domains(&["a.com", "b.com"]), 1_700_000_000_000)
                .unwrap();
        }

        let store = PolicyStore::open(&path);
        let snapshot = store.snapshot();
        assert_eq!(snapshot.user_id.as_deref(), Some("user-1"));
        assert_eq!(snapshot.blocked_domains, domains(&["a.com", "b.com"]));
        assert_eq!(snapshot.last_sync_time, 1_700_000_000_000);
        cleanup(&path);
    }

    #[test]
    fn test_corrupt_record_degrades() {
        let path = temp_record("corrupt");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"{ not json").unwrap();

        let store = PolicyStore::open(&path);
        assert_eq!(*store.snapshot(), Snapshot::default());
        cleanup(&path);
    }

    #[test]
    fn test_commit_preserves_user_id() {
        let store = PolicyStore::in_memory();
        store.set_user_id(Some("user-9".to_string())).unwrap();

        store.commit(domains(&["x.org"]), 42).unwrap();

        let snapshot = store.snapshot();
        assert_eq!(snapshot.user_id.as_deref(), Some("user-9"));
        assert_eq!(snapshot.last_sync_time, 42);
    }

    #[test]
    fn test_reader_keeps_old_snapshot_across_commit() {
        let store = PolicyStore::in_memory();
        store.commit(domains(&["a.com"]), 1).unwrap();

        let before = store.snapshot();
        store.commit(domains(&["b.com"]), 2).unwrap();

        // The earlier reader still sees its complete, consistent snapshot.
        assert_eq!(before.blocked_domains, domains(&["a.com"]));
        assert_eq!(before.last_sync_time, 1);
        assert_eq!(store.snapshot().blocked_domains, domains(&["b.com"]));
    }
}
