//! FocusGate Policy State
//!
//! Owns the authoritative local snapshot of blocked domains and the
//! decision path consulted on every outbound request.
//!
//! Architecture:
//! 1. SyncEngine commits refreshed domain sets through [`PolicyStore`]
//! 2. [`PolicyStore`] persists the record and swaps the in-memory snapshot
//! 3. [`RequestGate`] reads the snapshot per request → Allow / Redirect

mod gate;
mod snapshot;
mod store;

pub use gate::{GateDecision, RequestGate};
pub use snapshot::{Snapshot, normalize_domain};
pub use store::{PolicyStore, StoreError};
