//! Request Gate
//!
//! The decision point consulted on every outbound navigation/request.
//!
//! This is the HOT PATH - it reads the in-memory snapshot only, never the
//! network or disk, so the host can call it per request without perceptible
//! latency.
//!
//! Match rule: a host is redirected iff it equals a blocked domain or ends
//! with `"." + domain` (suffix at a label boundary). Case-insensitive;
//! blocked domains are literal hostnames, not wildcard patterns.

use crate::snapshot::normalize_domain;
use crate::store::PolicyStore;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;
use url::Url;

/// Result of evaluating one outbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// Request is allowed to proceed
    Allow,
    /// Request is redirected to the block notice
    Redirect {
        /// The (normalized) host that was blocked
        host: String,
        /// The blocked domain that matched
        rule: String,
    },
}

impl GateDecision {
    /// Check if the decision is a redirect.
    pub fn is_redirect(&self) -> bool {
        matches!(self, GateDecision::Redirect { .. })
    }

    /// Build the block-notice URL for a redirect, carrying the blocked
    /// hostname as the `domain` query parameter.
    ///
    /// Returns `None` for [`GateDecision::Allow`] or an unparseable base.
    pub fn notice_url(&self, notice_base: &str) -> Option<String> {
        match self {
            GateDecision::Allow => None,
            GateDecision::Redirect { host, .. } => {
                let mut url = Url::parse(notice_base).ok()?;
                url.query_pairs_mut().append_pair("domain", host);
                Some(url.to_string())
            }
        }
    }
}

/// Evaluation counters.
#[derive(Debug, Default)]
struct GateStats {
    evaluated: AtomicU64,
    redirected: AtomicU64,
}

/// Per-request policy gate over the current snapshot.
pub struct RequestGate {
    store: Arc<PolicyStore>,
    stats: GateStats,
}

impl RequestGate {
    /// Create a gate reading from the given store.
    pub fn new(store: Arc<PolicyStore>) -> Self {
        Self {
            store,
            stats: GateStats::default(),
        }
    }

    /// Decide whether a request to `target_host` is allowed or redirected.
    ///
    /// Purely in-memory; an empty domain set (including the window before
    /// the first successful sync) always allows.
    #[inline]
    pub fn evaluate(&self, target_host: &str) -> GateDecision {
        self.stats.evaluated.fetch_add(1, Ordering::Relaxed);

        let Some(host) = normalize_domain(target_host) else {
            return GateDecision::Allow;
        };

        let snapshot = self.store.snapshot();
        if snapshot.blocked_domains.is_empty() {
            return GateDecision::Allow;
        }

        if let Some(rule) = matching_rule(&snapshot.blocked_domains, &host) {
            self.stats.redirected.fetch_add(1, Ordering::Relaxed);
            debug!("Blocked request to {} (rule: {})", host, rule);
            return GateDecision::Redirect { host, rule };
        }

        GateDecision::Allow
    }

    /// Get (evaluated, redirected) counters.
    pub fn stats(&self) -> (u64, u64) {
        (
            self.stats.evaluated.load(Ordering::Relaxed),
            self.stats.redirected.load(Ordering::Relaxed),
        )
    }
}

/// Find the blocked domain matching `host`, walking parent labels so that
/// `sub.example.com` matches a rule for `example.com` but `notexample.com`
/// does not.
fn matching_rule(blocked: &HashSet<String>, host: &str) -> Option<String> {
    if blocked.contains(host) {
        return Some(host.to_string());
    }

    let mut rest = host;
    while let Some(dot) = rest.find('.') {
        rest = &rest[dot + 1..];
        if blocked.contains(rest) {
            return Some(rest.to_string());
        }
    }

    None
}
