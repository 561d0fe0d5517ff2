//! FocusGate Sync Layer
//!
//! Keeps the local policy snapshot in step with the remote rule service.
//!
//! Architecture:
//! 1. Timer fire or UI event → [`SyncEngine::refresh`]
//! 2. Single-flight: concurrent triggers join the fetch already in flight
//! 3. [`RuleSource`] fetch → normalize + dedupe → `PolicyStore::commit`
//! 4. Fetch failures keep the stale snapshot; the timer re-arms regardless

mod clock;
mod engine;
mod http;
mod source;

pub use clock::{ManualScheduler, Scheduler, TokioScheduler};
pub use engine::{SyncEngine, SyncFailure, SyncResult};
pub use http::{HttpRuleSource, RuleSourceConfig};
pub use source::{FetchError, Rule, RuleSource};
