//! Control surface worker and handle.

use crate::message::{ControlRequest, DomainListing, SyncOutcome};
use fgate_sync::{SyncEngine, SyncResult};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// Errors from the control surface itself. Sync failures are not errors
/// here; they come back inside [`SyncOutcome`].
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("Control worker is gone")]
    WorkerGone,
}

/// Handle for UI collaborators. Cheap to clone; all clones talk to the
/// same worker task.
#[derive(Clone)]
pub struct ControlSurface {
    tx: mpsc::Sender<ControlRequest>,
}

impl ControlSurface {
    /// Spawn the worker task over the given engine and return a handle.
    pub fn spawn(engine: SyncEngine) -> Self {
        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(run_worker(engine, rx));
        Self { tx }
    }

    /// Current user identifier, if configured.
    pub async fn get_user_id(&self) -> Result<Option<String>, ControlError> {
        self.request(|reply| ControlRequest::GetUserId { reply })
            .await
    }

    /// Replace the user identifier. Resolves once the store is updated and
    /// a refresh has been initiated (not necessarily completed); `true`
    /// means the identifier was durably stored.
    pub async fn set_user_id(&self, user_id: impl Into<String>) -> Result<bool, ControlError> {
        let user_id = user_id.into();
        self.request(move |reply| ControlRequest::SetUserId { user_id, reply })
            .await
    }

    /// Run a full refresh and await its outcome.
    pub async fn force_sync(&self) -> Result<SyncOutcome, ControlError> {
        self.request(|reply| ControlRequest::ForceSync { reply })
            .await
    }

    /// Remaining whole seconds until the next scheduled timer fire.
    pub async fn time_until_next_sync(&self) -> Result<u64, ControlError> {
        self.request(|reply| ControlRequest::GetTimeUntilNextSync { reply })
            .await
    }

    /// Current blocked-domain listing.
    pub async fn blocked_domains(&self) -> Result<DomainListing, ControlError> {
        self.request(|reply| ControlRequest::GetBlockedDomains { reply })
            .await
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> ControlRequest,
    ) -> Result<T, ControlError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(build(reply_tx))
            .await
            .map_err(|_| ControlError::WorkerGone)?;
        reply_rx.await.map_err(|_| ControlError::WorkerGone)
    }
}

/// Worker loop. Requests run to completion in arrival order; a forced
/// sync holds the loop while it awaits the refresh, which is the same
/// run-to-completion model the host's message handlers use.
async fn run_worker(engine: SyncEngine, mut rx: mpsc::Receiver<ControlRequest>) {
    debug!("Control worker started");

    while let Some(request) = rx.recv().await {
        match request {
            ControlRequest::GetUserId { reply } => {
                let _ = reply.send(engine.store().snapshot().user_id.clone());
            }
            ControlRequest::SetUserId { user_id, reply } => {
                let saved = match engine.set_user_id(&user_id) {
                    Ok(()) => true,
                    Err(e) => {
                        warn!("Failed to store user identifier: {}", e);
                        false
                    }
                };
                let _ = reply.send(saved);
            }
            ControlRequest::ForceSync { reply } => {
                let outcome = summarize(engine.refresh().await);
                let _ = reply.send(outcome);
            }
            ControlRequest::GetTimeUntilNextSync { reply } => {
                let _ = reply.send(engine.time_until_next_sync().as_secs());
            }
            ControlRequest::GetBlockedDomains { reply } => {
                let snapshot = engine.store().snapshot();
                let mut domains: Vec<String> =
                    snapshot.blocked_domains.iter().cloned().collect();
                domains.sort();
                let _ = reply.send(DomainListing {
                    domains,
                    last_sync_time: snapshot.last_sync_time,
                });
            }
        }
    }

    debug!("Control worker stopped");
}

fn summarize(result: SyncResult) -> SyncOutcome {
    match result {
        SyncResult::Success { domains, .. } => {
            let message = match domains.len() {
                1 => "1 domain blocked".to_string(),
                n => format!("{} domains blocked", n),
            };
            SyncOutcome {
                success: true,
                domains,
                message,
            }
        }
        SyncResult::Failure { reason } => SyncOutcome {
            success: false,
            domains: Vec::new(),
            message: format!("Sync failed: {}", reason),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use fgate_policy::PolicyStore;
    use fgate_sync::{FetchError, Rule, RuleSource, TokioScheduler};
    use std::sync::Arc;
    use std::time::Duration;

    struct StaticSource {
        response: Result<Vec<Rule>, FetchError>,
    }

    #[async_trait]
    impl RuleSource for StaticSource {
        async fn fetch_rules(&self, _user_id: &str) -> Result<Vec<Rule>, FetchError> {
            self.response.clone()
        }
    }

    fn surface_with(response: Result<Vec<Rule>, FetchError>) -> (ControlSurface, SyncEngine) {
        let store = Arc::new(PolicyStore::in_memory());
        let engine = SyncEngine::new(
            store,
            Arc::new(StaticSource { response }),
            Arc::new(TokioScheduler),
        );
        (ControlSurface::spawn(engine.clone()), engine)
    }

    fn rules(domains: &[&str]) -> Vec<Rule> {
        domains
            .iter()
            .map(|d| Rule {
                id: None,
                domain: d.to_string(),
            })
            .collect()
    }

    #[tokio::test]
    async fn test_user_id_round_trip() {
        let (surface, _engine) = surface_with(Ok(Vec::new()));

        assert_eq!(surface.get_user_id().await.unwrap(), None);

        assert!(surface.set_user_id("user-1").await.unwrap());
        assert_eq!(
            surface.get_user_id().await.unwrap(),
            Some("user-1".to_string())
        );

        // Clearing the identifier disables sync.
        assert!(surface.set_user_id("").await.unwrap());
        assert_eq!(surface.get_user_id().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_force_sync_reports_domain_count() {
        let (surface, _engine) = surface_with(Ok(rules(&["b.com", "a.com"])));
        surface.set_user_id("user-1").await.unwrap();

        let outcome = surface.force_sync().await.unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.domains, vec!["a.com", "b.com"]);
        assert_eq!(outcome.message, "2 domains blocked");
    }

    #[tokio::test]
    async fn test_force_sync_reports_failure_reason() {
        let (surface, _engine) =
            surface_with(Err(FetchError::Network("connection refused".to_string())));
        surface.set_user_id("user-1").await.unwrap();

        let outcome = surface.force_sync().await.unwrap();

        assert!(!outcome.success);
        assert!(outcome.domains.is_empty());
        assert!(outcome.message.contains("connection refused"));
    }

    #[tokio::test]
    async fn test_force_sync_without_user_is_benign() {
        let (surface, _engine) = surface_with(Ok(rules(&["a.com"])));

        let outcome = surface.force_sync().await.unwrap();

        assert!(!outcome.success);
        assert!(outcome.message.contains("no user identifier"));
    }

    #[tokio::test]
    async fn test_time_until_next_sync_tracks_timer() {
        let (surface, engine) = surface_with(Ok(Vec::new()));

        assert_eq!(surface.time_until_next_sync().await.unwrap(), 0);

        engine.start(Duration::from_secs(90));
        let remaining = surface.time_until_next_sync().await.unwrap();
        assert!(remaining > 85 && remaining <= 90);
        engine.stop();
    }

    #[tokio::test]
    async fn test_blocked_domains_listing() {
        let (surface, _engine) = surface_with(Ok(rules(&["tracker.net", "example.com"])));
        surface.set_user_id("user-1").await.unwrap();
        surface.force_sync().await.unwrap();

        let listing = surface.blocked_domains().await.unwrap();

        assert_eq!(listing.domains, vec!["example.com", "tracker.net"]);
        assert!(listing.last_sync_time > 0);
    }
}
