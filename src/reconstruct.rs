//! Cadence group reconstruction
//!
//! Turns the sparse per-metric series of one cadence group into a dense
//! table with one row for every integer step in `[0, max_step]`.
//!
//! ## Rules
//!
//! 1. `max_step` is the largest step reported by any series (0 if none).
//!    Steps above [`MAX_STEP`] are dropped with a warning.
//! 2. Values land on their reported step; everything else starts null.
//! 3. Repeated reports of a step keep the last non-null value in fetch order.
//! 4. Gaps are back-filled: a null takes the next later known value of the
//!    same metric. Values never move forward, so trailing nulls stay null.

use tracing::{debug, warn};

use crate::catalog::CadenceGroup;
use crate::series::{MetricPoint, MetricSeries};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Largest step a dense table indexes.
///
/// Points reported beyond it (for example a `u64::MAX` sentinel) are dropped
/// before the index is sized.
pub const MAX_STEP: u64 = 1 << 24;

/// A named column of nullable metric values.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricColumn {
    name: String,
    values: Vec<Option<f64>>,
}

impl MetricColumn {
    /// Create a column.
    #[must_use]
    pub fn new(name: impl Into<String>, values: Vec<Option<f64>>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    /// Column name (the metric name).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Values, one per row.
    #[must_use]
    pub fn values(&self) -> &[Option<f64>] {
        &self.values
    }

    /// Number of non-null values.
    #[must_use]
    pub fn non_null_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_some()).count()
    }

    pub(crate) fn into_values(self) -> Vec<Option<f64>> {
        self.values
    }
}

/// Back-fill nulls in place with the next later non-null value.
///
/// Positions after the last known value are left null.
///
/// # Example
///
/// ```rust
/// use metric_sync::reconstruct::backfill;
///
/// let mut values = vec![None, Some(2.0), None, None, Some(5.0), None];
/// backfill(&mut values);
/// assert_eq!(values, vec![Some(2.0), Some(2.0), Some(5.0), Some(5.0), Some(5.0), None]);
/// ```
pub fn backfill(values: &mut [Option<f64>]) {
    let mut next: Option<f64> = None;
    for slot in values.iter_mut().rev() {
        if slot.is_some() {
            next = *slot;
        } else {
            *slot = next;
        }
    }
}

/// Dense, gap-free table for one cadence group.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseTable {
    group: CadenceGroup,
    max_step: u64,
    columns: Vec<MetricColumn>,
}

impl DenseTable {
    /// Reconstruct the dense table of `group` from its fetched series.
    ///
    /// Columns follow the order of `series`. A series with no points still
    /// produces a column, entirely null.
    ///
    /// # Example
    ///
    /// ```rust
    /// use metric_sync::catalog::CadenceGroup;
    /// use metric_sync::reconstruct::DenseTable;
    /// use metric_sync::series::MetricSeries;
    ///
    /// let series = vec![MetricSeries::from_pairs("eval/acc", [(1, 0.4), (4, 0.6)])];
    /// let table = DenseTable::reconstruct(CadenceGroup::Eval, &series);
    ///
    /// assert_eq!(table.num_rows(), 5);
    /// assert_eq!(
    ///     table.column("eval/acc").unwrap().values(),
    ///     &[Some(0.4), Some(0.4), Some(0.6), Some(0.6), Some(0.6)]
    /// );
    /// ```
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn reconstruct(group: CadenceGroup, series: &[MetricSeries]) -> Self {
        for s in series {
            let dropped = s.points().iter().filter(|p| p.step > MAX_STEP).count();
            if dropped > 0 {
                warn!(%group, metric = s.name(), dropped, max = MAX_STEP, "dropping points beyond step limit");
            }
        }

        let max_step = series
            .iter()
            .flat_map(MetricSeries::points)
            .map(|p| p.step)
            .filter(|&step| step <= MAX_STEP)
            .max()
            .unwrap_or(0);
        let rows = max_step as usize + 1;

        let mut columns: Vec<MetricColumn> = series
            .iter()
            .map(|s| MetricColumn::new(s.name(), place(s.points(), rows)))
            .collect();

        #[cfg(feature = "parallel")]
        columns.par_iter_mut().for_each(|c| backfill(&mut c.values));
        #[cfg(not(feature = "parallel"))]
        columns.iter_mut().for_each(|c| backfill(&mut c.values));

        debug!(%group, rows, columns = columns.len(), "reconstructed dense table");

        Self {
            group,
            max_step,
            columns,
        }
    }

    /// Cadence group of this table.
    #[must_use]
    pub const fn group(&self) -> CadenceGroup {
        self.group
    }

    /// Largest step in the index.
    #[must_use]
    pub const fn max_step(&self) -> u64 {
        self.max_step
    }

    /// Number of rows (`max_step + 1`, at most `MAX_STEP + 1`).
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn num_rows(&self) -> usize {
        self.max_step as usize + 1
    }

    /// The `<group>_id` column: the integer step of every row.
    #[must_use]
    pub fn step_ids(&self) -> Vec<u64> {
        (0..=self.max_step).collect()
    }

    /// Metric columns in series order.
    #[must_use]
    pub fn columns(&self) -> &[MetricColumn] {
        &self.columns
    }

    /// Look up a metric column by name.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&MetricColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Series view of the table, one point per row and column.
    ///
    /// Reconstructing these series yields the same table.
    #[must_use]
    pub fn to_series(&self) -> Vec<MetricSeries> {
        self.columns
            .iter()
            .map(|c| {
                let points = (0..=self.max_step)
                    .zip(&c.values)
                    .map(|(step, value)| MetricPoint { step, value: *value })
                    .collect();
                MetricSeries::new(c.name.clone(), points)
            })
            .collect()
    }

    pub(crate) fn into_columns(self) -> Vec<MetricColumn> {
        self.columns
    }
}

/// Place points on a null-initialized index of `rows` slots.
///
/// Last non-null report per step wins.
#[allow(clippy::cast_possible_truncation)]
fn place(points: &[MetricPoint], rows: usize) -> Vec<Option<f64>> {
    let mut values = vec![None; rows];
    for point in points {
        let Ok(slot) = usize::try_from(point.step) else {
            continue;
        };
        if let (Some(v), Some(cell)) = (point.value, values.get_mut(slot)) {
            *cell = Some(v);
        }
    }
    values
}
