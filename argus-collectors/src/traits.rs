//! The collector capability contract

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use argus_core::Evidence;

/// Errors from collector runs. Failures are isolated per collector; a bulk
/// run reports them without cancelling siblings.
#[derive(Debug, Error)]
pub enum CollectError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("lookup failed: {0}")]
    Lookup(String),

    #[error("api returned status {status}: {body}")]
    Api { status: u16, body: String },

    #[error("payload serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("evidence storage failed: {0}")]
    Storage(#[from] std::io::Error),

    #[error("plugin '{name}' exited with status {code}: {stderr}")]
    PluginExit {
        name: String,
        code: i32,
        stderr: String,
    },

    #[error("plugin '{0}' produced invalid output: {1}")]
    PluginOutput(String, String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// Common interface for all collection plugins.
///
/// `collect` must never block indefinitely - every network call inside it
/// carries its own timeout. Evidence rows come back with the raw payload
/// already persisted and hashed; the caller persists the rows and feeds them
/// to ingestion.
#[async_trait]
pub trait Collector: Send + Sync {
    /// Registry name, e.g. "dns"
    fn name(&self) -> &str;

    /// One-line human description
    fn description(&self) -> &str;

    /// Whether this collector performs intrusive reconnaissance requiring
    /// explicit operator consent
    fn is_active(&self) -> bool;

    /// Run a collection against a target within a case.
    async fn collect(&self, case_id: &str, target: &str)
        -> Result<Vec<Evidence>, CollectError>;
}
