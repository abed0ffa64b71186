//! Per-metric fetch pool
//!
//! Fan-out/fan-in over the metrics of one cadence group: every metric is
//! fetched by its own task on a bounded pool, each task returns its own
//! series tagged with its position, and the caller reassembles the results
//! in input order once every task has finished.
//!
//! Failure domains are per metric. An error or timeout turns into an empty
//! series and a warning; sibling fetches keep running.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::remote::ExperimentPlatform;
use crate::series::MetricSeries;
use crate::Error;

/// Default upper bound on concurrent fetches per group.
pub const DEFAULT_MAX_WORKERS: usize = 10;

/// Default per-metric request timeout.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(120);

/// Fetch pool settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchSettings {
    /// Maximum concurrent fetches
    pub max_workers: usize,
    /// Per-metric timeout in seconds
    pub timeout_secs: u64,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
            timeout_secs: DEFAULT_FETCH_TIMEOUT.as_secs(),
        }
    }
}

/// Bounded pool of independent per-metric fetches.
#[derive(Debug, Clone)]
pub struct FetchPool {
    max_workers: usize,
    timeout: Duration,
}

impl Default for FetchPool {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_WORKERS, DEFAULT_FETCH_TIMEOUT)
    }
}

impl From<FetchSettings> for FetchPool {
    fn from(settings: FetchSettings) -> Self {
        Self::new(settings.max_workers, Duration::from_secs(settings.timeout_secs))
    }
}

impl FetchPool {
    /// Create a pool. `max_workers` is clamped to at least one.
    #[must_use]
    pub fn new(max_workers: usize, timeout: Duration) -> Self {
        Self {
            max_workers: max_workers.max(1),
            timeout,
        }
    }

    /// Maximum concurrent fetches.
    #[must_use]
    pub const fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Per-metric timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Fetch every metric of `metrics` independently.
    ///
    /// Returns exactly one series per input name, in input order. Failed,
    /// timed-out or panicked fetches yield an empty series.
    pub async fn fetch_group<P>(
        &self,
        platform: &Arc<P>,
        handle: &str,
        metrics: &[String],
    ) -> Vec<MetricSeries>
    where
        P: ExperimentPlatform + 'static,
    {
        if metrics.is_empty() {
            return Vec::new();
        }

        let workers = metrics.len().min(self.max_workers);
        let semaphore = Arc::new(Semaphore::new(workers));
        debug!(metrics = metrics.len(), workers, "dispatching metric fetches");

        let mut tasks = JoinSet::new();
        for (index, metric) in metrics.iter().enumerate() {
            let platform = Arc::clone(platform);
            let semaphore = Arc::clone(&semaphore);
            let handle = handle.to_string();
            let metric = metric.clone();
            let limit = self.timeout;

            tasks.spawn(async move {
                let outcome = match semaphore.acquire_owned().await {
                    Ok(_permit) => match timeout(limit, platform.fetch_series(&handle, &metric)).await
                    {
                        Ok(Ok(points)) => Ok(points),
                        Ok(Err(e)) => Err(e),
                        Err(_) => Err(Error::metric_fetch(
                            &metric,
                            format!("timed out after {limit:?}"),
                        )),
                    },
                    Err(e) => Err(Error::metric_fetch(&metric, e)),
                };
                (index, metric, outcome)
            });
        }

        let mut slots: Vec<Option<MetricSeries>> = vec![None; metrics.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, metric, Ok(points))) => {
                    debug!(%metric, points = points.len(), "fetched metric");
                    slots[index] = Some(MetricSeries::new(metric, points));
                }
                Ok((index, metric, Err(e))) => {
                    warn!(%metric, error = %e, "metric fetch failed, treating as empty");
                    slots[index] = Some(MetricSeries::empty(metric));
                }
                Err(e) => warn!(error = %e, "metric fetch task aborted"),
            }
        }

        // Panicked tasks leave their slot unset.
        slots
            .into_iter()
            .zip(metrics)
            .map(|(slot, metric)| slot.unwrap_or_else(|| MetricSeries::empty(metric.as_str())))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MemoryPlatform;
    use crate::series::MetricPoint;

    #[tokio::test]
    async fn test_results_follow_input_order() {
        let platform = Arc::new(MemoryPlatform::new());
        for (i, name) in ["a/1", "a/2", "a/3"].iter().enumerate() {
            platform.insert_series("run", name, vec![MetricPoint::new(i as u64, 1.0)]);
        }
        let names: Vec<String> = vec!["a/3".into(), "a/1".into(), "a/2".into()];

        let series = FetchPool::default().fetch_group(&platform, "run", &names).await;
        let got: Vec<&str> = series.iter().map(MetricSeries::name).collect();
        assert_eq!(got, vec!["a/3", "a/1", "a/2"]);
        assert_eq!(series[0].points()[0].step, 2);
    }

    #[tokio::test]
    async fn test_missing_metric_becomes_empty() {
        let platform = Arc::new(MemoryPlatform::new());
        platform.insert_series("run", "train/loss", vec![MetricPoint::new(0, 0.5)]);
        let names: Vec<String> = vec!["train/loss".into(), "train/gone".into()];

        let series = FetchPool::new(1, Duration::from_secs(5))
            .fetch_group(&platform, "run", &names)
            .await;
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].len(), 1);
        assert!(series[1].is_empty());
        assert_eq!(series[1].name(), "train/gone");
    }

    #[tokio::test]
    async fn test_empty_group() {
        let platform = Arc::new(MemoryPlatform::new());
        let series = FetchPool::default().fetch_group(&platform, "run", &[]).await;
        assert!(series.is_empty());
    }

    #[test]
    fn test_zero_workers_clamped() {
        let pool = FetchPool::from(FetchSettings {
            max_workers: 0,
            timeout_secs: 3,
        });
        assert_eq!(pool.max_workers(), 1);
        assert_eq!(pool.timeout(), Duration::from_secs(3));
    }
}
