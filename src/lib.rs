//! # metric-sync: Cadence-Aligned Metric Reconstruction
//!
//! Training frameworks log the same quantities under different names, on
//! different step axes, to different tracking platforms. metric-sync pulls
//! each run's metrics, rebuilds a dense table per logging cadence, merges the
//! cadences onto the training step axis and republishes the result under one
//! canonical vocabulary.
//!
//! ## Pipeline
//!
//! - **Catalog**: list the run's metrics and classify them into `train`,
//!   `rollout` and `eval` cadence groups by name prefix
//! - **Fetch**: pull every metric with its own request on a bounded pool
//! - **Reconstruct**: index every step `0..=max_step`, back-fill gaps
//! - **Merge**: align the groups on the train step axis
//! - **Throughput**: derive `perf/throughput` from raw performance counters
//!
//! ## Example Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use metric_sync::export::Exporter;
//! use metric_sync::remote::MemoryPlatform;
//! use metric_sync::series::MetricPoint;
//!
//! # async fn example() -> metric_sync::Result<()> {
//! let platform = Arc::new(MemoryPlatform::new());
//! platform.insert_series("run", "train/loss", vec![MetricPoint::new(0, 0.9), MetricPoint::new(2, 0.7)]);
//! platform.insert_series("run", "eval/acc", vec![MetricPoint::new(1, 0.4)]);
//!
//! let dataset = Exporter::new(platform).export("run", None).await?;
//! assert_eq!(dataset.steps(), &[0, 1, 2]);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod align;
pub mod catalog;
pub mod config;
pub mod error;
pub mod export;
pub mod fetch;
pub mod merge;
pub mod reconstruct;
pub mod remote;
pub mod series;
pub mod storage;
pub mod throughput;

pub use error::{Error, Result};
