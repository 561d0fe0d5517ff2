//! Agent Configuration
//!
//! Defaults overridable through `FOCUSGATE_*` environment variables. The
//! sync interval is explicit configuration, never hard-coded elsewhere.

use fgate_policy::PolicyStore;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Complete agent configuration.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Base URL of the rule service
    pub endpoint: String,
    /// Cadence of the recurring refresh timer
    pub sync_interval: Duration,
    /// Bound on a single rule fetch
    pub fetch_timeout: Duration,
    /// Location of the persisted policy record
    pub storage_path: PathBuf,
    /// Optional user identifier to apply at startup
    pub user_id: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://localhost:443".to_string(),
            sync_interval: Duration::from_secs(300), // 5 minutes
            fetch_timeout: Duration::from_secs(10),
            storage_path: PolicyStore::default_location(),
            user_id: None,
        }
    }
}

impl AgentConfig {
    /// Build a configuration from the environment over the defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(endpoint) = std::env::var("FOCUSGATE_ENDPOINT") {
            config.endpoint = endpoint;
        }
        if let Ok(secs) = std::env::var("FOCUSGATE_SYNC_INTERVAL_SECS") {
            config.sync_interval = Duration::from_secs(parse_seconds(&secs)?);
        }
        if let Ok(secs) = std::env::var("FOCUSGATE_FETCH_TIMEOUT_SECS") {
            config.fetch_timeout = Duration::from_secs(parse_seconds(&secs)?);
        }
        if let Ok(path) = std::env::var("FOCUSGATE_STORAGE_PATH") {
            config.storage_path = PathBuf::from(path);
        }
        if let Ok(user_id) = std::env::var("FOCUSGATE_USER_ID") {
            if !user_id.trim().is_empty() {
                config.user_id = Some(user_id.trim().to_string());
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = Url::parse(&self.endpoint)
            .map_err(|_| ConfigError::InvalidEndpoint(self.endpoint.clone()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidEndpoint(self.endpoint.clone()));
        }
        if self.sync_interval < Duration::from_secs(1) {
            return Err(ConfigError::IntervalTooShort);
        }
        if self.fetch_timeout < Duration::from_secs(1) {
            return Err(ConfigError::TimeoutTooShort);
        }
        Ok(())
    }
}

fn parse_seconds(raw: &str) -> Result<u64, ConfigError> {
    raw.parse()
        .map_err(|_| ConfigError::InvalidSeconds(raw.to_string()))
}

/// Configuration errors.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("Invalid rule service endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Invalid seconds value: {0}")]
    InvalidSeconds(String),

    #[error("Sync interval too short (minimum 1s)")]
    IntervalTooShort,

    #[error("Fetch timeout too short (minimum 1s)")]
    TimeoutTooShort,
}
