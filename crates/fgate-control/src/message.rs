//! Message types exchanged with UI collaborators.

use tokio::sync::oneshot;

/// Requests served by the control worker. Each variant carries the reply
/// channel for its response.
#[derive(Debug)]
pub enum ControlRequest {
    /// Get the configured user identifier
    GetUserId {
        reply: oneshot::Sender<Option<String>>,
    },
    /// Replace the user identifier; acked (`true` = durably stored) once
    /// the store is updated and a refresh has been initiated
    SetUserId {
        user_id: String,
        reply: oneshot::Sender<bool>,
    },
    /// Run a full refresh and report the outcome
    ForceSync {
        reply: oneshot::Sender<SyncOutcome>,
    },
    /// Remaining whole seconds until the next scheduled timer fire
    GetTimeUntilNextSync { reply: oneshot::Sender<u64> },
    /// Current blocked-domain listing, for settings surfaces
    GetBlockedDomains {
        reply: oneshot::Sender<DomainListing>,
    },
}

/// Result summary returned to a forced-sync caller.
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    /// Whether a snapshot was committed
    pub success: bool,
    /// The committed domains (empty on failure), sorted
    pub domains: Vec<String>,
    /// Human-readable summary: domain count, or the failure reason
    pub message: String,
}

/// Current blocked-domain listing.
#[derive(Debug, Clone)]
pub struct DomainListing {
    /// Blocked domains, sorted
    pub domains: Vec<String>,
    /// Epoch millis of the last successful sync (0 = never)
    pub last_sync_time: u64,
}
