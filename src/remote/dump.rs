//! JSON run dump client.
//!
//! Reads run histories that were exported from a tracking platform into JSON
//! files, one file per run:
//!
//! ```json
//! {
//!   "metrics": {
//!     "train/loss": [{"step": 0, "value": 0.91}, {"step": 1, "value": 0.88}],
//!     "eval/acc":   [{"step": 1, "value": 0.42}]
//!   }
//! }
//! ```
//!
//! The run handle is the file path relative to the dump root.
//!
//! Histories are parsed per point: a point without a non-negative integer
//! `step` or a numeric `value` is dropped with a warning, and a history that
//! is not an array reads as empty. Only unreadable JSON or a `metrics` field
//! that is not an object fails the whole run.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::ExperimentPlatform;
use crate::series::MetricPoint;
use crate::{Error, Result};

/// On-disk layout of one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RunDump {
    /// Metric name to history
    #[serde(default, deserialize_with = "lenient_histories")]
    pub metrics: BTreeMap<String, Vec<MetricPoint>>,
}

fn lenient_histories<'de, D>(
    deserializer: D,
) -> std::result::Result<BTreeMap<String, Vec<MetricPoint>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<String, Value>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|(metric, history)| {
            let points = lenient_points(&metric, history);
            (metric, points)
        })
        .collect())
}

fn lenient_points(metric: &str, history: Value) -> Vec<MetricPoint> {
    let Value::Array(items) = history else {
        warn!(%metric, "history is not an array, treating as empty");
        return Vec::new();
    };

    let total = items.len();
    let points: Vec<MetricPoint> = items
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect();
    if points.len() < total {
        warn!(%metric, dropped = total - points.len(), "dropped malformed points");
    }
    points
}

/// Platform client backed by JSON dumps under a root directory.
///
/// Each dump is parsed once and kept for the lifetime of the client.
pub struct JsonDumpPlatform {
    root: PathBuf,
    loaded: DashMap<String, Arc<RunDump>>,
}

impl JsonDumpPlatform {
    /// Create a client reading dumps below `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            loaded: DashMap::new(),
        }
    }

    /// Dump root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn load(&self, handle: &str) -> Result<Arc<RunDump>> {
        let cached = self.loaded.get(handle).map(|dump| Arc::clone(dump.value()));
        if let Some(dump) = cached {
            return Ok(dump);
        }

        let path = self.root.join(handle);
        debug!(path = %path.display(), "reading run dump");
        let bytes = tokio::fs::read(&path).await?;
        let dump: RunDump = serde_json::from_slice(&bytes)?;
        let dump = Arc::new(dump);
        self.loaded.insert(handle.to_string(), Arc::clone(&dump));
        Ok(dump)
    }
}

impl ExperimentPlatform for JsonDumpPlatform {
    async fn list_metric_names(&self, handle: &str) -> Result<Vec<String>> {
        let dump = self
            .load(handle)
            .await
            .map_err(|e| Error::remote_query(handle, e))?;
        Ok(dump.metrics.keys().cloned().collect())
    }

    async fn fetch_series(&self, handle: &str, metric: &str) -> Result<Vec<MetricPoint>> {
        let dump = self
            .load(handle)
            .await
            .map_err(|e| Error::metric_fetch(metric, e))?;
        dump.metrics
            .get(metric)
            .cloned()
            .ok_or_else(|| Error::metric_fetch(metric, "metric not present in dump"))
    }
}
