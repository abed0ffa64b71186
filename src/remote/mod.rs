//! Remote experiment platform clients
//!
//! The reconstruction pipeline only needs two read-only queries from a
//! tracking platform: the list of metric names of a run, and the full
//! history of one metric. There is no multi-metric history query: combined
//! queries drop rows when metrics are logged on different or sparse steps.
//!
//! # Example
//!
//! ```rust
//! use metric_sync::remote::{ExperimentPlatform, MemoryPlatform};
//! use metric_sync::series::MetricPoint;
//!
//! # async fn example() -> metric_sync::Result<()> {
//! let platform = MemoryPlatform::new();
//! platform.insert_series("team/proj/run-1", "train/loss", vec![MetricPoint::new(0, 0.9)]);
//!
//! let names = platform.list_metric_names("team/proj/run-1").await?;
//! assert_eq!(names, vec!["train/loss".to_string()]);
//! # Ok(())
//! # }
//! ```

mod dump;
mod memory;

pub use dump::{JsonDumpPlatform, RunDump};
pub use memory::MemoryPlatform;

use crate::series::MetricPoint;
use crate::Result;
use std::future::Future;

/// Read-only client for an experiment tracking platform.
pub trait ExperimentPlatform: Send + Sync {
    /// List every metric name logged by the experiment.
    ///
    /// An error here is fatal for the export of that experiment.
    fn list_metric_names(&self, handle: &str)
        -> impl Future<Output = Result<Vec<String>>> + Send;

    /// Fetch the full `(step, value)` history of one metric, in platform order.
    fn fetch_series(
        &self,
        handle: &str,
        metric: &str,
    ) -> impl Future<Output = Result<Vec<MetricPoint>>> + Send;
}
