//! Group merger - one row-aligned dataset from the cadence tables
//!
//! The primary table (train, or the first present group when train is
//! missing) fixes the row count and order. Every other group is joined by
//! position on its own step identifier: row `i` takes that group's row `i`
//! if the group reached step `i`, and nulls otherwise. Nothing is
//! interpolated across cadence boundaries.

use rustc_hash::FxHashMap;
use tracing::{info, warn};

use crate::catalog::CadenceGroup;
use crate::reconstruct::{DenseTable, MetricColumn};

/// Name of the primary step column.
pub const STEP_COLUMN: &str = "step";

/// Step-identifier column of one cadence group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdColumn {
    group: CadenceGroup,
    values: Vec<Option<u64>>,
}

impl IdColumn {
    /// Create an id column.
    #[must_use]
    pub const fn new(group: CadenceGroup, values: Vec<Option<u64>>) -> Self {
        Self { group, values }
    }

    /// Cadence group.
    #[must_use]
    pub const fn group(&self) -> CadenceGroup {
        self.group
    }

    /// Column name (`<group>_id`).
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.group.id_column()
    }

    /// Group step per row, null where the group has no row.
    #[must_use]
    pub fn values(&self) -> &[Option<u64>] {
        &self.values
    }
}

/// Merged dataset of one experiment.
///
/// Column layout: `step`, one `<group>_id` per present group, then the
/// metric columns of every group in merge order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergedDataset {
    primary: Option<CadenceGroup>,
    steps: Vec<u64>,
    ids: Vec<IdColumn>,
    metrics: Vec<MetricColumn>,
    index: FxHashMap<String, usize>,
}

impl MergedDataset {
    /// Merge reconstructed cadence tables.
    ///
    /// Tables may come in any order; they are merged train, rollout, eval.
    /// A metric name that appears in more than one table keeps its first
    /// column.
    #[must_use]
    pub fn merge(tables: impl IntoIterator<Item = DenseTable>) -> Self {
        let mut tables: Vec<DenseTable> = tables.into_iter().collect();
        tables.sort_by_key(DenseTable::group);

        let Some(primary) = tables.first() else {
            return Self::default();
        };
        let primary_group = primary.group();
        let rows = primary.num_rows();
        let mut dataset = Self {
            primary: Some(primary_group),
            steps: (0..rows as u64).collect(),
            ..Self::default()
        };

        for table in tables {
            let group = table.group();
            let group_rows = table.num_rows();
            let ids = (0..rows)
                .map(|i| (i < group_rows).then_some(i as u64))
                .collect();
            dataset.ids.push(IdColumn::new(group, ids));

            for column in table.into_columns() {
                if dataset.index.contains_key(column.name()) {
                    warn!(metric = column.name(), %group, "duplicate metric column dropped");
                    continue;
                }
                let name = column.name().to_string();
                let mut values = column.into_values();
                values.resize(rows, None);
                dataset.push_metric(MetricColumn::new(name, values));
            }
        }

        info!(
            primary = %primary_group,
            rows,
            columns = dataset.metrics.len(),
            "merged cadence groups"
        );
        dataset
    }

    /// Assemble a dataset from raw columns.
    ///
    /// Columns shorter than `steps` are padded with nulls.
    #[must_use]
    pub fn from_parts(
        primary: Option<CadenceGroup>,
        steps: Vec<u64>,
        ids: Vec<IdColumn>,
        metrics: Vec<MetricColumn>,
    ) -> Self {
        let rows = steps.len();
        let mut dataset = Self {
            primary,
            steps,
            ids: Vec::with_capacity(ids.len()),
            ..Self::default()
        };
        for mut id in ids {
            id.values.resize(rows, None);
            dataset.ids.push(id);
        }
        for column in metrics {
            dataset.insert_metric(column);
        }
        dataset
    }

    /// Group that defines the row axis, `None` for an empty dataset.
    #[must_use]
    pub const fn primary(&self) -> Option<CadenceGroup> {
        self.primary
    }

    /// Number of rows.
    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.steps.len()
    }

    /// True if the dataset has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// The `step` column.
    #[must_use]
    pub fn steps(&self) -> &[u64] {
        &self.steps
    }

    /// Step-identifier columns of the present groups.
    #[must_use]
    pub fn id_columns(&self) -> &[IdColumn] {
        &self.ids
    }

    /// Step-identifier column of `group`, if that group is present.
    #[must_use]
    pub fn id_column(&self, group: CadenceGroup) -> Option<&IdColumn> {
        self.ids.iter().find(|c| c.group == group)
    }

    /// Metric columns.
    #[must_use]
    pub fn metrics(&self) -> &[MetricColumn] {
        &self.metrics
    }

    /// Look up a metric column.
    #[must_use]
    pub fn metric(&self, name: &str) -> Option<&MetricColumn> {
        self.index.get(name).map(|&i| &self.metrics[i])
    }

    /// True if a column (step, id or metric) named `name` exists.
    #[must_use]
    pub fn has_column(&self, name: &str) -> bool {
        name == STEP_COLUMN
            || self.ids.iter().any(|c| c.name() == name)
            || self.index.contains_key(name)
    }

    /// All column names in layout order.
    #[must_use]
    pub fn column_names(&self) -> Vec<&str> {
        std::iter::once(STEP_COLUMN)
            .chain(self.ids.iter().map(|id| -> &str { id.name() }))
            .chain(self.metrics.iter().map(MetricColumn::name))
            .collect()
    }

    /// Add a metric column, replacing an existing column of the same name.
    ///
    /// The column is padded or truncated to the row count.
    pub fn insert_metric(&mut self, column: MetricColumn) {
        let name = column.name().to_string();
        let mut values = column.into_values();
        values.resize(self.num_rows(), None);
        let column = MetricColumn::new(name, values);
        let existing = self.index.get(column.name()).copied();
        match existing {
            Some(i) => self.metrics[i] = column,
            None => self.push_metric(column),
        }
    }

    fn push_metric(&mut self, column: MetricColumn) {
        self.index.insert(column.name().to_string(), self.metrics.len());
        self.metrics.push(column);
    }
}
