//! In-memory platform client using `DashMap`.
//!
//! Holds run histories in process memory. Used by tests and by callers that
//! already have the histories at hand (for example from another exporter).

use super::ExperimentPlatform;
use crate::series::MetricPoint;
use crate::{Error, Result};
use dashmap::DashMap;

/// In-memory experiment platform keyed by run handle.
///
/// Thread-safe; runs can be populated while fetches are in flight.
///
/// # Example
///
/// ```rust
/// use metric_sync::remote::{ExperimentPlatform, MemoryPlatform};
/// use metric_sync::series::MetricPoint;
///
/// # async fn example() -> metric_sync::Result<()> {
/// let platform = MemoryPlatform::new();
/// platform.insert_series("run", "eval/acc", vec![MetricPoint::new(3, 0.7)]);
/// let points = platform.fetch_series("run", "eval/acc").await?;
/// assert_eq!(points.len(), 1);
/// # Ok(())
/// # }
/// ```
pub struct MemoryPlatform {
    runs: DashMap<String, Vec<(String, Vec<MetricPoint>)>>,
}

impl MemoryPlatform {
    /// Create an empty platform.
    #[must_use]
    pub fn new() -> Self {
        Self {
            runs: DashMap::new(),
        }
    }

    /// Register an empty run so that listing it succeeds.
    pub fn insert_run(&self, handle: &str) {
        self.runs.entry(handle.to_string()).or_default();
    }

    /// Set the history of `metric` in run `handle`, replacing any previous one.
    ///
    /// Metric listing order follows first insertion.
    pub fn insert_series(&self, handle: &str, metric: &str, points: Vec<MetricPoint>) {
        let mut run = self.runs.entry(handle.to_string()).or_default();
        match run.iter_mut().find(|(name, _)| name == metric) {
            Some((_, existing)) => *existing = points,
            None => run.push((metric.to_string(), points)),
        }
    }

    /// Number of runs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.runs.len()
    }

    /// Check if no run is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}

impl Default for MemoryPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl ExperimentPlatform for MemoryPlatform {
    async fn list_metric_names(&self, handle: &str) -> Result<Vec<String>> {
        self.runs
            .get(handle)
            .map(|run| run.iter().map(|(name, _)| name.clone()).collect())
            .ok_or_else(|| Error::remote_query(handle, "run not found"))
    }

    async fn fetch_series(&self, handle: &str, metric: &str) -> Result<Vec<MetricPoint>> {
        let run = self
            .runs
            .get(handle)
            .ok_or_else(|| Error::metric_fetch(metric, format!("run '{handle}' not found")))?;
        run.iter()
            .find(|(name, _)| name == metric)
            .map(|(_, points)| points.clone())
            .ok_or_else(|| Error::metric_fetch(metric, "metric not logged by run"))
    }
}
