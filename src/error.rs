//! Error types for metric-sync
//!
//! Only `RemoteQuery` is fatal for an experiment export. Per-metric fetch
//! failures are recovered by the fetch pool and never surface here.

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// metric-sync error types
#[derive(Error, Debug)]
pub enum Error {
    /// Listing the metric catalog of a remote experiment failed
    #[error("Remote query failed for experiment '{handle}': {reason}\nThe export of this experiment was aborted")]
    RemoteQuery {
        /// Experiment handle that was queried
        handle: String,
        /// Underlying failure
        reason: String,
    },

    /// Fetching a single metric failed or timed out
    #[error("Failed to fetch metric '{metric}': {reason}")]
    MetricFetch {
        /// Metric name
        metric: String,
        /// Underlying failure
        reason: String,
    },

    /// Configuration missing, malformed or inconsistent
    #[error("Configuration error: {0}\nSee secrets/config.yaml or config.yaml")]
    Config(String),

    /// Artifact cache error (Parquet/Arrow)
    #[error("Storage error: {0}")]
    StorageError(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Arrow error
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Parquet error
    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    /// JSON (run dumps, publish payloads)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML (configuration)
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Build a `RemoteQuery` error for `handle`.
    pub fn remote_query(handle: impl Into<String>, reason: impl ToString) -> Self {
        Self::RemoteQuery {
            handle: handle.into(),
            reason: reason.to_string(),
        }
    }

    /// Build a `MetricFetch` error for `metric`.
    pub fn metric_fetch(metric: impl Into<String>, reason: impl ToString) -> Self {
        Self::MetricFetch {
            metric: metric.into(),
            reason: reason.to_string(),
        }
    }
}
