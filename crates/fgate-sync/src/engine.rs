//! Sync Engine
//!
//! Orchestrates policy refresh: timer-driven and on-demand, writing
//! results through the policy store.
//!
//! Flow:
//! 1. Timer fire or UI event → `refresh()`
//! 2. Single-flight check: join the fetch already in flight, if any
//! 3. RuleSource fetch → normalize + dedupe → PolicyStore commit
//! 4. The gate reads the new snapshot on the next request
//!
//! A refresh failure keeps the stale-but-valid snapshot; the next attempt
//! is the next timer fire or an explicit manual trigger. Single-flight
//! also removes the out-of-order-commit race between interleaved fetches
//! by construction, so no further locking is needed around commits.

use crate::clock::Scheduler;
use crate::source::{FetchError, RuleSource};
use fgate_policy::{PolicyStore, StoreError, normalize_domain};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Why a refresh attempt failed.
#[derive(Debug, Clone, Error)]
pub enum SyncFailure {
    /// No user identifier configured; benign idle state, not an error
    #[error("no user identifier configured")]
    NoUser,

    /// Endpoint unreachable, timed out, or returned a non-2xx status
    #[error("rule service unreachable: {0}")]
    Network(String),

    /// Response body was not JSON
    #[error("malformed rule payload: {0}")]
    MalformedPayload(String),

    /// The refreshed snapshot could not be persisted
    #[error("failed to persist snapshot: {0}")]
    Storage(String),
}

/// Outcome of one refresh attempt. Produced once per attempt, consumed by
/// every caller that joined it, then dropped.
#[derive(Debug, Clone)]
pub enum SyncResult {
    /// A new snapshot was committed
    Success {
        /// The committed domains, sorted for stable presentation
        domains: Vec<String>,
        /// Commit timestamp (epoch millis)
        timestamp: u64,
    },
    /// The persisted snapshot was left untouched
    Failure { reason: SyncFailure },
}

impl SyncResult {
    /// Check if the refresh committed a snapshot.
    pub fn is_success(&self) -> bool {
        matches!(self, SyncResult::Success { .. })
    }
}

/// Recurring refresh timer state. Re-armed after every fire, whether the
/// refresh succeeded or failed; one fire per wake-up, never a backlog.
struct RefreshTimer {
    interval: Duration,
    next_fire_millis: u64,
    task: Option<JoinHandle<()>>,
}

struct EngineShared {
    store: Arc<PolicyStore>,
    source: Arc<dyn RuleSource>,
    scheduler: Arc<dyn Scheduler>,
    /// Receiver for the refresh currently in flight, if any
    inflight: tokio::sync::Mutex<Option<watch::Receiver<Option<SyncResult>>>>,
    timer: Mutex<RefreshTimer>,
}

impl EngineShared {
    /// The actual refresh work. Runs inside the single-flight task.
    async fn do_refresh(&self) -> SyncResult {
        let Some(user_id) = self.store.snapshot().user_id.clone() else {
            debug!("Refresh skipped: no user identifier configured");
            return SyncResult::Failure {
                reason: SyncFailure::NoUser,
            };
        };

        let rules = match self.source.fetch_rules(&user_id).await {
            Ok(rules) => rules,
            Err(FetchError::MalformedPayload(detail)) => {
                warn!("Refresh failed, keeping stale snapshot: malformed payload: {}", detail);
                return SyncResult::Failure {
                    reason: SyncFailure::MalformedPayload(detail),
                };
            }
            Err(e) => {
                warn!("Refresh failed, keeping stale snapshot: {}", e);
                return SyncResult::Failure {
                    reason: SyncFailure::Network(e.to_string()),
                };
            }
        };

        // An empty rule list is an explicit "no rules" state and
        // deliberately overwrites the cached set, so server-side rule
        // removal takes effect.
        let domains: HashSet<String> = rules
            .iter()
            .filter_map(|rule| normalize_domain(&rule.domain))
            .collect();
        let timestamp = self.scheduler.now_millis();

        if let Err(e) = self.store.commit(domains.clone(), timestamp) {
            warn!("Fetched {} domains but commit failed: {}", domains.len(), e);
            return SyncResult::Failure {
                reason: SyncFailure::Storage(e.to_string()),
            };
        }

        let mut domains: Vec<String> = domains.into_iter().collect();
        domains.sort();
        info!("Synced {} blocked domains", domains.len());
        SyncResult::Success { domains, timestamp }
    }
}

/// Orchestrates snapshot refresh against the rule source.
///
/// Cheap to clone; clones share the same engine state.
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<EngineShared>,
}

impl SyncEngine {
    /// Create an engine over the given store, source, and scheduler.
    pub fn new(
        store: Arc<PolicyStore>,
        source: Arc<dyn RuleSource>,
        scheduler: Arc<dyn Scheduler>,
    ) -> Self {
        Self {
            inner: Arc::new(EngineShared {
                store,
                source,
                scheduler,
                inflight: tokio::sync::Mutex::new(None),
                timer: Mutex::new(RefreshTimer {
                    interval: Duration::ZERO,
                    next_fire_millis: 0,
                    task: None,
                }),
            }),
        }
    }

    /// Refresh the snapshot now, or join the refresh already in flight.
    ///
    /// Single-flight: concurrent callers share one network fetch and
    /// receive the same [`SyncResult`]. The fetch runs in its own task, so
    /// it always runs to completion even if the requesting caller goes
    /// away.
    pub async fn refresh(&self) -> SyncResult {
        let mut rx = {
            let mut inflight = self.inner.inflight.lock().await;
            if let Some(rx) = inflight.as_ref() {
                debug!("Joining refresh already in flight");
                rx.clone()
            } else {
                let (tx, rx) = watch::channel(None);
                *inflight = Some(rx.clone());

                let inner = self.inner.clone();
                tokio::spawn(async move {
                    let result = inner.do_refresh().await;
                    *inner.inflight.lock().await = None;
                    let _ = tx.send(Some(result));
                });
                rx
            }
        };

        loop {
            if let Some(result) = rx.borrow_and_update().clone() {
                return result;
            }
            if rx.changed().await.is_err() {
                // Only reachable if the runtime tears the task down.
                return SyncResult::Failure {
                    reason: SyncFailure::Network("refresh task aborted".to_string()),
                };
            }
        }
    }

    /// Replace the user identifier and initiate a refresh.
    ///
    /// An empty or whitespace-only id clears the identifier and disables
    /// sync. The triggered refresh is fire-and-forget; callers that need
    /// the outcome go through a forced sync instead.
    pub fn set_user_id(&self, id: &str) -> Result<(), StoreError> {
        let trimmed = id.trim();
        let user_id = if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        };
        self.inner.store.set_user_id(user_id)?;

        let engine = self.clone();
        tokio::spawn(async move {
            engine.refresh().await;
        });
        Ok(())
    }

    /// Arm (or re-arm, at a new cadence) the recurring refresh timer.
    pub fn start(&self, interval: Duration) {
        let mut timer = self.inner.timer.lock().unwrap();
        if let Some(task) = timer.task.take() {
            task.abort();
        }
        timer.interval = interval;
        timer.next_fire_millis =
            self.inner.scheduler.now_millis() + interval.as_millis() as u64;
        info!("Refresh timer armed: every {:?}", interval);

        let engine = self.clone();
        timer.task = Some(tokio::spawn(async move {
            loop {
                let delay = engine.time_until_next_sync();
                engine.inner.scheduler.sleep(delay).await;

                {
                    let mut timer = engine.inner.timer.lock().unwrap();
                    let interval_millis = timer.interval.as_millis() as u64;
                    timer.next_fire_millis =
                        engine.inner.scheduler.now_millis() + interval_millis;
                }

                engine.refresh().await;
            }
        }));
    }

    /// Cancel the recurring timer.
    pub fn stop(&self) {
        let mut timer = self.inner.timer.lock().unwrap();
        if let Some(task) = timer.task.take() {
            task.abort();
            debug!("Refresh timer cancelled");
        }
        timer.next_fire_millis = 0;
    }

    /// Remaining time until the next scheduled fire; zero when no timer
    /// is armed.
    pub fn time_until_next_sync(&self) -> Duration {
        let timer = self.inner.timer.lock().unwrap();
        Duration::from_millis(
            timer
                .next_fire_millis
                .saturating_sub(self.inner.scheduler.now_millis()),
        )
    }

    /// The store this engine commits through.
    pub fn store(&self) -> &Arc<PolicyStore> {
        &self.inner.store
    }
}
