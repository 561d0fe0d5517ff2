//! Policy snapshot types.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// The immutable-at-a-point-in-time bundle of blocked domains, last sync
/// time, and user identifier.
///
/// An empty domain set means either "no rules" or "not yet synced"; the two
/// are distinguished by `last_sync_time == 0`. An absent `user_id` means
/// synchronization is disabled.
///
/// The serialized form matches the persisted record layout:
/// `{"userId", "blockedDomains", "lastSyncTime"}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Snapshot {
    /// Opaque user identifier for the rule service
    pub user_id: Option<String>,
    /// Blocked domains, normalized to lowercase
    pub blocked_domains: HashSet<String>,
    /// Epoch millis of the last successful sync (0 = never)
    pub last_sync_time: u64,
}

impl Snapshot {
    /// Whether at least one sync has completed successfully.
    pub fn has_synced(&self) -> bool {
        self.last_sync_time != 0
    }

    /// Whether a user identifier is configured (sync enabled).
    pub fn sync_enabled(&self) -> bool {
        self.user_id.is_some()
    }
}

/// Normalize a raw domain or hostname to its canonical blocking key.
///
/// Trims whitespace, strips a single trailing root dot, and lowercases.
/// Returns `None` for strings that are not plausible hostnames: empty,
/// containing a path separator, or containing interior whitespace.
pub fn normalize_domain(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_suffix('.').unwrap_or(trimmed);

    if trimmed.is_empty() || trimmed.contains('/') || trimmed.contains(char::is_whitespace) {
        return None;
    }

    Some(trimmed.to_ascii_lowercase())
}
