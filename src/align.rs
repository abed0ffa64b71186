//! Metric alignment and publish payloads
//!
//! Frameworks name the same quantity differently. A [`MetricMapping`]
//! renames source columns to the canonical vocabulary (`aligned_metrics`);
//! the [`AlignmentReport`] tells which canonical names a dataset can supply,
//! and [`publish_rows`] turns the dataset into per-step payloads for the
//! comparison dashboard. None of these mutate the dataset.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::merge::MergedDataset;

/// Source column name to canonical name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricMapping {
    pairs: BTreeMap<String, String>,
}

impl MetricMapping {
    /// Resolve the effective mapping of a framework.
    ///
    /// With an explicit mapping, entries mapped to `null` are dropped. Without
    /// one, every aligned metric maps to itself.
    #[must_use]
    pub fn resolve(
        mapping: Option<&BTreeMap<String, Option<String>>>,
        aligned_metrics: &[String],
    ) -> Self {
        let pairs = match mapping {
            Some(mapping) => mapping
                .iter()
                .filter_map(|(src, dst)| dst.as_ref().map(|d| (src.clone(), d.clone())))
                .collect(),
            None => {
                debug!("no mapping configured, using aligned metric names as-is");
                aligned_metrics.iter().map(|m| (m.clone(), m.clone())).collect()
            }
        };
        Self { pairs }
    }

    /// Pairs in source-name order.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(s, d)| (s.as_str(), d.as_str()))
    }

    /// Canonical name of `source`, if mapped.
    #[must_use]
    pub fn target(&self, source: &str) -> Option<&str> {
        self.pairs.get(source).map(String::as_str)
    }

    /// Number of mapped names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// True if nothing is mapped.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// Coverage of the aligned metric vocabulary by one dataset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlignmentReport {
    /// Aligned names the dataset can supply
    pub available: BTreeSet<String>,
    /// Aligned names the dataset cannot supply
    pub missing: BTreeSet<String>,
    /// Size of the aligned vocabulary
    pub total: usize,
}

impl AlignmentReport {
    /// Check which aligned metrics `dataset` provides through `mapping`.
    ///
    /// A canonical name counts as available when some metric column mapped
    /// to it exists in the dataset. `step` and `<group>_id` are never
    /// published and do not count.
    #[must_use]
    pub fn check(dataset: &MergedDataset, aligned_metrics: &[String], mapping: &MetricMapping) -> Self {
        let aligned: BTreeSet<String> = aligned_metrics.iter().cloned().collect();
        let available: BTreeSet<String> = mapping
            .pairs()
            .filter(|(src, dst)| dataset.metric(src).is_some() && aligned.contains(*dst))
            .map(|(_, dst)| dst.to_string())
            .collect();
        let missing = aligned.difference(&available).cloned().collect();

        Self {
            available,
            missing,
            total: aligned.len(),
        }
    }

    /// True if every aligned metric is available.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }

    /// Log the report for `framework`.
    pub fn log(&self, framework: &str) {
        if self.is_complete() {
            info!(framework, total = self.total, "all aligned metrics present");
        } else {
            warn!(
                framework,
                available = self.available.len(),
                total = self.total,
                missing = ?self.missing,
                "aligned metrics missing"
            );
        }
    }
}

/// One dashboard log call: canonical name to value at `step`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishRow {
    /// Dashboard step
    pub step: u64,
    /// Canonical metric values
    pub payload: BTreeMap<String, f64>,
}

/// Build the dashboard payloads for `dataset`, ordered by step.
///
/// Only mapped, non-null cells are published; rows with nothing to publish
/// are skipped.
#[must_use]
pub fn publish_rows(dataset: &MergedDataset, mapping: &MetricMapping) -> Vec<PublishRow> {
    let columns: Vec<(&str, &[Option<f64>])> = mapping
        .pairs()
        .filter_map(|(src, dst)| dataset.metric(src).map(|c| (dst, c.values())))
        .collect();

    let mut order: Vec<usize> = (0..dataset.num_rows()).collect();
    order.sort_by_key(|&i| dataset.steps()[i]);

    order
        .into_iter()
        .filter_map(|row| {
            let payload: BTreeMap<String, f64> = columns
                .iter()
                .filter_map(|(dst, values)| values[row].map(|v| ((*dst).to_string(), v)))
                .collect();
            (!payload.is_empty()).then(|| PublishRow {
                step: dataset.steps()[row],
                payload,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CadenceGroup;
    use crate::merge::IdColumn;
    use crate::reconstruct::MetricColumn;

    fn dataset() -> MergedDataset {
        MergedDataset::from_parts(
            Some(CadenceGroup::Train),
            vec![0, 1, 2],
            Vec::new(),
            vec![
                MetricColumn::new("train/loss", vec![Some(1.0), Some(0.5), None]),
                MetricColumn::new("rollout/raw_reward", vec![None, Some(0.2), None]),
            ],
        )
    }

    fn aligned() -> Vec<String> {
        vec!["loss".to_string(), "reward".to_string(), "kl".to_string()]
    }

    fn explicit() -> BTreeMap<String, Option<String>> {
        BTreeMap::from([
            ("train/loss".to_string(), Some("loss".to_string())),
            ("rollout/raw_reward".to_string(), Some("reward".to_string())),
            ("train/kl".to_string(), Some("kl".to_string())),
            ("train/grad_norm".to_string(), None),
        ])
    }

    #[test]
    fn test_resolve_drops_null_targets() {
        let mapping = MetricMapping::resolve(Some(&explicit()), &aligned());
        assert_eq!(mapping.len(), 3);
        assert_eq!(mapping.target("train/loss"), Some("loss"));
        assert_eq!(mapping.target("train/grad_norm"), None);
    }

    #[test]
    fn test_resolve_identity() {
        let mapping = MetricMapping::resolve(None, &aligned());
        assert_eq!(mapping.target("kl"), Some("kl"));
        assert_eq!(mapping.len(), 3);
    }

    #[test]
    fn test_report_missing() {
        let mapping = MetricMapping::resolve(Some(&explicit()), &aligned());
        let report = AlignmentReport::check(&dataset(), &aligned(), &mapping);
        assert_eq!(report.total, 3);
        assert_eq!(report.available, BTreeSet::from(["loss".to_string(), "reward".to_string()]));
        assert_eq!(report.missing, BTreeSet::from(["kl".to_string()]));
        assert!(!report.is_complete());
    }

    #[test]
    fn test_index_columns_are_not_aligned() {
        let dataset = MergedDataset::from_parts(
            Some(CadenceGroup::Train),
            vec![0, 1],
            vec![IdColumn::new(CadenceGroup::Train, vec![Some(0), Some(1)])],
            vec![MetricColumn::new("train/loss", vec![Some(1.0), None])],
        );
        let aligned = vec!["loss".to_string(), "iteration".to_string()];
        let mapping = MetricMapping::resolve(
            Some(&BTreeMap::from([
                ("train/loss".to_string(), Some("loss".to_string())),
                ("train_id".to_string(), Some("iteration".to_string())),
            ])),
            &aligned,
        );

        let report = AlignmentReport::check(&dataset, &aligned, &mapping);
        assert_eq!(report.missing, BTreeSet::from(["iteration".to_string()]));

        let rows = publish_rows(&dataset, &mapping);
        assert!(rows.iter().all(|r| !r.payload.contains_key("iteration")));
        for row in &rows {
            assert!(row.payload.keys().all(|k| report.available.contains(k)));
        }
    }

    #[test]
    fn test_publish_rows_skip_empty() {
        let mapping = MetricMapping::resolve(Some(&explicit()), &aligned());
        let rows = publish_rows(&dataset(), &mapping);

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].step, 0);
        assert_eq!(rows[0].payload, BTreeMap::from([("loss".to_string(), 1.0)]));
        assert_eq!(rows[1].payload.len(), 2);
        assert_eq!(rows[1].payload["reward"], 0.2);
    }
}
