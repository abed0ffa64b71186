//! Metric series - per-metric time series as returned by a platform
//!
//! A series is produced by exactly one fetch and keeps the points in the
//! order the platform returned them. That order is what resolves duplicate
//! reports at the same step during reconstruction.

use serde::{Deserialize, Serialize};

/// A single `(step, value)` observation.
///
/// Platforms may report a step with no value (for example a row logged for
/// another metric); such points carry `None`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct MetricPoint {
    /// Logging step
    pub step: u64,
    /// Observed value, if any
    pub value: Option<f64>,
}

impl MetricPoint {
    /// Create a point with a value.
    #[must_use]
    pub const fn new(step: u64, value: f64) -> Self {
        Self {
            step,
            value: Some(value),
        }
    }

    /// Create a point at `step` with no value.
    #[must_use]
    pub const fn empty(step: u64) -> Self {
        Self { step, value: None }
    }
}

/// Full series for one metric name, in fetch order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricSeries {
    name: String,
    points: Vec<MetricPoint>,
}

impl MetricSeries {
    /// Create a series from fetched points.
    #[must_use]
    pub fn new(name: impl Into<String>, points: Vec<MetricPoint>) -> Self {
        Self {
            name: name.into(),
            points,
        }
    }

    /// Create an empty series (used when a fetch fails).
    #[must_use]
    pub fn empty(name: impl Into<String>) -> Self {
        Self::new(name, Vec::new())
    }

    /// Build a series from `(step, value)` pairs.
    #[must_use]
    pub fn from_pairs<I>(name: impl Into<String>, pairs: I) -> Self
    where
        I: IntoIterator<Item = (u64, f64)>,
    {
        Self::new(
            name,
            pairs
                .into_iter()
                .map(|(step, value)| MetricPoint::new(step, value))
                .collect(),
        )
    }

    /// Metric name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Points in fetch order.
    #[must_use]
    pub fn points(&self) -> &[MetricPoint] {
        &self.points
    }

    /// Number of points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// True if the series has no points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Largest reported step, or `None` for an empty series.
    #[must_use]
    pub fn max_step(&self) -> Option<u64> {
        self.points.iter().map(|p| p.step).max()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_series_from_pairs() {
        let series = MetricSeries::from_pairs("train/loss", [(0, 1.0), (1, 0.5)]);
        assert_eq!(series.name(), "train/loss");
        assert_eq!(series.len(), 2);
        assert_eq!(series.points()[1], MetricPoint::new(1, 0.5));
    }

    #[test]
    fn test_max_step_ignores_order() {
        let series = MetricSeries::from_pairs("eval/acc", [(4, 0.1), (2, 0.2), (9, 0.3), (3, 0.4)]);
        assert_eq!(series.max_step(), Some(9));
    }

    #[test]
    fn test_empty_series() {
        let series = MetricSeries::empty("perf/step_time");
        assert!(series.is_empty());
        assert_eq!(series.max_step(), None);
    }

    #[test]
    fn test_point_without_value_counts_for_max_step() {
        let series = MetricSeries::new(
            "rollout/x",
            vec![MetricPoint::new(0, 1.0), MetricPoint::empty(5)],
        );
        assert_eq!(series.max_step(), Some(5));
    }
}
