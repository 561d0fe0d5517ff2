//! Rule source port.
//!
//! Abstracts the remote rule service: given a user identifier, return that
//! user's current blocking rules or fail. The sync engine only ever talks
//! to this trait, so tests can swap in scripted sources.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// Errors while fetching rules.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Connection failed: {0}")]
    Network(String),

    #[error("Rule service returned status {0}")]
    Status(u16),

    #[error("Request timed out")]
    Timeout,

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),
}

/// A server-defined record mapping a user to a domain that should be
/// blocked. Unknown fields are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct Rule {
    #[serde(default)]
    pub id: Option<i64>,
    pub domain: String,
}

/// Remote source of per-user blocking rules.
#[async_trait]
pub trait RuleSource: Send + Sync {
    /// Fetch the current rules for `user_id`.
    async fn fetch_rules(&self, user_id: &str) -> Result<Vec<Rule>, FetchError>;
}

/// Decode a rule-service response body.
///
/// The service encodes "no active rules" as an empty array or JSON `null`
/// (a nil slice on the server side); any valid-JSON non-array body is
/// treated the same way. Only a body that is not JSON at all is malformed.
/// Array entries without a string `domain` field are skipped.
pub(crate) fn decode_rules(body: &[u8]) -> Result<Vec<Rule>, FetchError> {
    let value: Value =
        serde_json::from_slice(body).map_err(|e| FetchError::MalformedPayload(e.to_string()))?;

    match value {
        Value::Array(items) => Ok(items
            .into_iter()
            .filter_map(|item| serde_json::from_value::<Rule>(item).ok())
            .collect()),
        _ => Ok(Vec::new()),
    }
}
