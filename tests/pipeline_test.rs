//! End-to-end pipeline tests
//!
//! catalog -> per-metric fetch -> reconstruct -> merge -> throughput,
//! driven through `Exporter` against in-memory and failing platforms.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use metric_sync::catalog::CadenceGroup;
use metric_sync::export::Exporter;
use metric_sync::fetch::FetchPool;
use metric_sync::remote::{ExperimentPlatform, MemoryPlatform};
use metric_sync::series::MetricPoint;
use metric_sync::throughput::THROUGHPUT;
use metric_sync::{Error, Result};

/// Platform wrapper that fails or stalls selected metrics.
struct FlakyPlatform {
    inner: MemoryPlatform,
    failing: HashSet<String>,
    stalled: HashSet<String>,
    catalog_down: bool,
    fetches: AtomicUsize,
}

impl FlakyPlatform {
    fn new(inner: MemoryPlatform) -> Self {
        Self {
            inner,
            failing: HashSet::new(),
            stalled: HashSet::new(),
            catalog_down: false,
            fetches: AtomicUsize::new(0),
        }
    }
}

impl ExperimentPlatform for FlakyPlatform {
    async fn list_metric_names(&self, handle: &str) -> Result<Vec<String>> {
        if self.catalog_down {
            return Err(Error::Other("history_keys unavailable".to_string()));
        }
        self.inner.list_metric_names(handle).await
    }

    async fn fetch_series(&self, handle: &str, metric: &str) -> Result<Vec<MetricPoint>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.failing.contains(metric) {
            return Err(Error::metric_fetch(metric, "HTTP 500"));
        }
        if self.stalled.contains(metric) {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        self.inner.fetch_series(handle, metric).await
    }
}

fn points(pairs: &[(u64, f64)]) -> Vec<MetricPoint> {
    pairs.iter().map(|&(s, v)| MetricPoint::new(s, v)).collect()
}

#[tokio::test]
async fn test_end_to_end_train_and_eval() {
    let platform = MemoryPlatform::new();
    platform.insert_series("run", "train/loss", points(&[(0, 1.0), (1, 0.8), (2, 0.6)]));
    platform.insert_series("run", "eval/acc", points(&[(1, 0.4)]));

    let dataset = Exporter::new(Arc::new(platform)).export("run", None).await.unwrap();

    assert_eq!(dataset.steps(), &[0, 1, 2]);
    assert_eq!(
        dataset.metric("eval/acc").unwrap().values(),
        &[Some(0.4), Some(0.4), None]
    );
    assert_eq!(
        dataset.metric("train/loss").unwrap().values(),
        &[Some(1.0), Some(0.8), Some(0.6)]
    );
    assert!(dataset.id_column(CadenceGroup::Rollout).is_none());
    assert!(dataset.column_names().iter().all(|c| !c.starts_with("rollout")));
    assert!(dataset.has_column("train_id"));
    assert!(dataset.has_column("eval_id"));
}

#[tokio::test]
async fn test_fetch_isolation() {
    let inner = MemoryPlatform::new();
    inner.insert_series("run", "train/a", points(&[(0, 1.0), (2, 3.0)]));
    inner.insert_series("run", "train/b", points(&[(1, 5.0), (4, 6.0)]));
    let mut platform = FlakyPlatform::new(inner);
    platform.failing.insert("train/a".to_string());
    let platform = Arc::new(platform);

    let dataset = Exporter::new(Arc::clone(&platform)).export("run", None).await.unwrap();

    assert_eq!(dataset.num_rows(), 5);
    assert!(dataset.metric("train/a").unwrap().values().iter().all(Option::is_none));
    assert_eq!(
        dataset.metric("train/b").unwrap().values(),
        &[Some(5.0), Some(5.0), Some(6.0), Some(6.0), Some(6.0)]
    );
    assert_eq!(platform.fetches.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_timed_out_metric_does_not_block_siblings() {
    let inner = MemoryPlatform::new();
    inner.insert_series("run", "rollout/slow", points(&[(9, 1.0)]));
    inner.insert_series("run", "rollout/fast", points(&[(0, 1.0), (3, 2.0)]));
    let mut platform = FlakyPlatform::new(inner);
    platform.stalled.insert("rollout/slow".to_string());

    let exporter = Exporter::new(Arc::new(platform))
        .with_pool(FetchPool::new(4, Duration::from_millis(50)));
    let dataset = exporter.export("run", None).await.unwrap();

    assert_eq!(dataset.primary(), Some(CadenceGroup::Rollout));
    assert_eq!(dataset.num_rows(), 4);
    assert!(dataset.metric("rollout/slow").unwrap().values().iter().all(Option::is_none));
    assert_eq!(dataset.metric("rollout/fast").unwrap().non_null_count(), 4);
}

#[tokio::test]
async fn test_catalog_failure_is_fatal() {
    let inner = MemoryPlatform::new();
    inner.insert_series("run", "train/loss", points(&[(0, 1.0)]));
    let mut platform = FlakyPlatform::new(inner);
    platform.catalog_down = true;
    let platform = Arc::new(platform);

    let err = Exporter::new(Arc::clone(&platform)).export("run", None).await.unwrap_err();

    assert!(matches!(err, Error::RemoteQuery { ref handle, .. } if handle == "run"));
    assert_eq!(platform.fetches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_throughput_derived_with_gpu_count() {
    let platform = MemoryPlatform::new();
    platform.insert_series("run", "train/loss", points(&[(0, 1.0), (1, 0.9)]));
    platform.insert_series("run", "perf/actor_train_tok_per_s", points(&[(0, 100.0), (1, 100.0)]));
    platform.insert_series("run", "perf/actor_train_time", points(&[(0, 2.0), (1, 2.0)]));
    platform.insert_series("run", "perf/step_time", points(&[(0, 5.0), (1, 0.0)]));

    let dataset = Exporter::new(Arc::new(platform)).export("run", Some(8)).await.unwrap();

    assert_eq!(dataset.metric(THROUGHPUT).unwrap().values(), &[Some(5.0), None]);
}

#[tokio::test]
async fn test_throughput_skipped_without_gpu_count() {
    let platform = MemoryPlatform::new();
    platform.insert_series("run", "train/loss", points(&[(0, 1.0)]));
    platform.insert_series("run", "perf/actor_train_tok_per_s", points(&[(0, 100.0)]));
    platform.insert_series("run", "perf/actor_train_time", points(&[(0, 2.0)]));
    platform.insert_series("run", "perf/step_time", points(&[(0, 5.0)]));

    let dataset = Exporter::new(Arc::new(platform)).export("run", None).await.unwrap();

    assert!(!dataset.has_column(THROUGHPUT));
}

#[tokio::test]
async fn test_unclassified_metrics_excluded() {
    let platform = MemoryPlatform::new();
    platform.insert_series("run", "train/loss", points(&[(0, 1.0)]));
    platform.insert_series("run", "foo/bar", points(&[(0, 1.0)]));
    platform.insert_series("run", "_timestamp", points(&[(0, 1.7e9)]));

    let dataset = Exporter::new(Arc::new(platform)).export("run", None).await.unwrap();

    assert!(!dataset.has_column("foo/bar"));
    assert!(!dataset.has_column("_timestamp"));
    assert_eq!(dataset.metrics().len(), 1);
}

#[tokio::test]
async fn test_run_without_metrics_gives_empty_dataset() {
    let platform = MemoryPlatform::new();
    platform.insert_run("run");

    let dataset = Exporter::new(Arc::new(platform)).export("run", Some(8)).await.unwrap();

    assert!(dataset.is_empty());
    assert_eq!(dataset.primary(), None);
}

#[tokio::test]
async fn test_out_of_range_step_is_dropped() {
    let platform = MemoryPlatform::new();
    platform.insert_series("run", "train/loss", points(&[(0, 1.0), (1, 0.5)]));
    platform.insert_series("run", "eval/acc", points(&[(0, 0.3), (u64::MAX, 0.9)]));

    let dataset = Exporter::new(Arc::new(platform)).export("run", None).await.unwrap();

    assert_eq!(dataset.num_rows(), 2);
    assert_eq!(dataset.metric("eval/acc").unwrap().values(), &[Some(0.3), None]);
    assert_eq!(
        dataset.id_column(CadenceGroup::Eval).unwrap().values(),
        &[Some(0), None]
    );
}
