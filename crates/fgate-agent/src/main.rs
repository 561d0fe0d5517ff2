//! FocusGate Agent
//!
//! Client-side network policy agent: syncs a per-user blocked-domain list
//! from the rule service, persists it locally, and serves the request gate
//! and control surface to the embedding host.

mod config;

use anyhow::Result;
use config::AgentConfig;
use fgate_control::ControlSurface;
use fgate_policy::PolicyStore;
use fgate_sync::{HttpRuleSource, RuleSourceConfig, SyncEngine, TokioScheduler};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

// Use mimalloc as the global allocator for reduced memory fragmentation
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .init();

    let config = AgentConfig::from_env()?;
    info!("FocusGate agent starting (endpoint: {})", config.endpoint);

    let store = Arc::new(PolicyStore::open(config.storage_path.clone()));
    let source = Arc::new(HttpRuleSource::new(RuleSourceConfig {
        endpoint: config.endpoint.clone(),
        timeout: config.fetch_timeout,
        ..RuleSourceConfig::default()
    }));
    let engine = SyncEngine::new(store.clone(), source, Arc::new(TokioScheduler));

    let surface = ControlSurface::spawn(engine.clone());
    engine.start(config.sync_interval);

    if let Some(user_id) = &config.user_id {
        if surface.set_user_id(user_id.clone()).await? {
            info!("User identifier applied from environment");
        }
    } else if store.snapshot().sync_enabled() {
        // A user is already configured; sync immediately on startup.
        let outcome = surface.force_sync().await?;
        info!("Startup sync: {}", outcome.message);
    } else {
        info!("No user identifier configured; sync idle until one is set");
    }

    info!("Agent running; press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;

    engine.stop();
    info!("FocusGate agent shutting down");
    Ok(())
}
