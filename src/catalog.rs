//! Metric catalog - cadence classification of remote metric names
//!
//! Every training framework logs on up to three step axes: the optimizer
//! step (`train`), the rollout/generation step (`rollout`) and the evaluation
//! step (`eval`). Which axis a metric lives on is decided by its name prefix
//! through an ordered rule table; the first matching rule wins.
//!
//! ## Default rules
//!
//! | Group     | Prefixes                                           |
//! |-----------|----------------------------------------------------|
//! | `train`   | `train/`                                           |
//! | `rollout` | `rollout/`, `multi_turn/`, `passrate/`, `perf/`    |
//! | `eval`    | `eval/`                                            |

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::remote::ExperimentPlatform;
use crate::{Error, Result};

/// Logging cadence (step axis) of a metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CadenceGroup {
    /// Optimizer steps (primary axis)
    Train,
    /// Rollout / generation steps
    Rollout,
    /// Evaluation steps
    Eval,
}

impl CadenceGroup {
    /// All groups in merge order (primary axis first).
    pub const ALL: [Self; 3] = [Self::Train, Self::Rollout, Self::Eval];

    /// Lowercase group name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Train => "train",
            Self::Rollout => "rollout",
            Self::Eval => "eval",
        }
    }

    /// Name of the step-identifier column (`train_id`, `rollout_id`, `eval_id`).
    #[must_use]
    pub const fn id_column(self) -> &'static str {
        match self {
            Self::Train => "train_id",
            Self::Rollout => "rollout_id",
            Self::Eval => "eval_id",
        }
    }
}

impl fmt::Display for CadenceGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the classification table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CadenceRule {
    /// Group assigned on match
    pub group: CadenceGroup,
    /// Name prefixes that select this group
    pub prefixes: Vec<String>,
}

impl CadenceRule {
    /// Create a rule.
    #[must_use]
    pub fn new<I, S>(group: CadenceGroup, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            group,
            prefixes: prefixes.into_iter().map(Into::into).collect(),
        }
    }

    fn matches(&self, name: &str) -> bool {
        self.prefixes.iter().any(|p| name.starts_with(p.as_str()))
    }
}

/// Ordered prefix table mapping metric names to cadence groups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CadenceRules {
    rules: Vec<CadenceRule>,
}

impl Default for CadenceRules {
    fn default() -> Self {
        Self::new(vec![
            CadenceRule::new(CadenceGroup::Train, ["train/"]),
            CadenceRule::new(
                CadenceGroup::Rollout,
                ["rollout/", "multi_turn/", "passrate/", "perf/"],
            ),
            CadenceRule::new(CadenceGroup::Eval, ["eval/"]),
        ])
    }
}

impl CadenceRules {
    /// Create a table from rules, evaluated in order.
    #[must_use]
    pub const fn new(rules: Vec<CadenceRule>) -> Self {
        Self { rules }
    }

    /// Rules in evaluation order.
    #[must_use]
    pub fn rules(&self) -> &[CadenceRule] {
        &self.rules
    }

    /// Classify a metric name. `None` means the metric is not cadence-aligned.
    #[must_use]
    pub fn classify(&self, name: &str) -> Option<CadenceGroup> {
        self.rules.iter().find(|r| r.matches(name)).map(|r| r.group)
    }
}

/// Platform bookkeeping keys that never take part in reconstruction.
fn is_bookkeeping(name: &str) -> bool {
    name.starts_with("system") || name == "_timestamp"
}

/// Metric names of one experiment, grouped by cadence.
///
/// Names keep the order in which the platform listed them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricCatalog {
    groups: BTreeMap<CadenceGroup, Vec<String>>,
    excluded: Vec<String>,
}

impl MetricCatalog {
    /// Classify a list of metric names.
    #[must_use]
    pub fn classify<I, S>(names: I, rules: &CadenceRules) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut catalog = Self::default();
        for name in names {
            let name = name.into();
            if is_bookkeeping(&name) {
                continue;
            }
            match rules.classify(&name) {
                Some(group) => {
                    let members = catalog.groups.entry(group).or_default();
                    if !members.contains(&name) {
                        members.push(name);
                    }
                }
                None => catalog.excluded.push(name),
            }
        }
        catalog
    }

    /// List and classify the metrics of a remote experiment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RemoteQuery`] if the catalog cannot be listed.
    pub async fn resolve<P>(platform: &P, handle: &str, rules: &CadenceRules) -> Result<Self>
    where
        P: ExperimentPlatform + ?Sized,
    {
        let names = platform
            .list_metric_names(handle)
            .await
            .map_err(|e| match e {
                e @ Error::RemoteQuery { .. } => e,
                other => Error::remote_query(handle, other),
            })?;

        let catalog = Self::classify(names, rules);
        for (group, members) in &catalog.groups {
            info!(%group, metrics = members.len(), "classified metrics");
        }
        if !catalog.excluded.is_empty() {
            debug!(excluded = ?catalog.excluded, "metrics outside any cadence group");
        }
        Ok(catalog)
    }

    /// Metric names assigned to `group` (empty if none matched).
    #[must_use]
    pub fn metrics(&self, group: CadenceGroup) -> &[String] {
        self.groups.get(&group).map(Vec::as_slice).unwrap_or_default()
    }

    /// Groups with at least one metric, in merge order.
    pub fn groups(&self) -> impl Iterator<Item = (CadenceGroup, &[String])> {
        self.groups.iter().map(|(g, m)| (*g, m.as_slice()))
    }

    /// Names that matched no rule.
    #[must_use]
    pub fn excluded(&self) -> &[String] {
        &self.excluded
    }

    /// Total number of classified metrics.
    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    /// True if no metric was classified.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
