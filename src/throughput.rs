//! Throughput derivation
//!
//! `perf/throughput` is tokens per second per GPU over the whole step:
//!
//! ```text
//! throughput = (actor_train_tok_per_s * actor_train_time) / (step_time * n_gpus)
//! ```
//!
//! The derivation runs only when a GPU count is configured and all three
//! input columns exist. Rows with a missing input or a zero denominator get
//! a null result.

use tracing::{debug, info};

use crate::merge::MergedDataset;
use crate::reconstruct::MetricColumn;

/// Actor training tokens per second.
pub const TOKENS_PER_SECOND: &str = "perf/actor_train_tok_per_s";
/// Actor training time per step.
pub const TRAIN_TIME: &str = "perf/actor_train_time";
/// Wall-clock time per step.
pub const STEP_TIME: &str = "perf/step_time";
/// Derived column.
pub const THROUGHPUT: &str = "perf/throughput";

/// Outcome of [`derive_throughput`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Derivation {
    /// Column added; carries the number of non-null rows
    Added(usize),
    /// No GPU count configured
    NoGpuCount,
    /// One or more input columns are missing
    MissingInputs,
}

/// Throughput of a single row, `None` when undefined.
#[must_use]
pub fn row_throughput(
    tok_per_s: Option<f64>,
    train_time: Option<f64>,
    step_time: Option<f64>,
    n_gpus: u32,
) -> Option<f64> {
    let denominator = step_time? * f64::from(n_gpus);
    if denominator == 0.0 {
        return None;
    }
    let value = tok_per_s? * train_time? / denominator;
    value.is_finite().then_some(value)
}

/// Add `perf/throughput` to `dataset` when possible.
///
/// Never fails: an unconfigured GPU count or missing inputs skip the step.
pub fn derive_throughput(dataset: &mut MergedDataset, n_gpus: Option<u32>) -> Derivation {
    let Some(n_gpus) = n_gpus.filter(|&n| n > 0) else {
        debug!("n_gpus not configured, skipping throughput");
        return Derivation::NoGpuCount;
    };

    let (Some(tok), Some(train), Some(step)) = (
        dataset.metric(TOKENS_PER_SECOND),
        dataset.metric(TRAIN_TIME),
        dataset.metric(STEP_TIME),
    ) else {
        let missing: Vec<&str> = [TOKENS_PER_SECOND, TRAIN_TIME, STEP_TIME]
            .into_iter()
            .filter(|name| dataset.metric(name).is_none())
            .collect();
        info!(?missing, "throughput inputs missing, skipping derivation");
        return Derivation::MissingInputs;
    };

    let values: Vec<Option<f64>> = tok
        .values()
        .iter()
        .zip(train.values())
        .zip(step.values())
        .map(|((&t, &tt), &st)| row_throughput(t, tt, st, n_gpus))
        .collect();

    let column = MetricColumn::new(THROUGHPUT, values);
    let filled = column.non_null_count();
    dataset.insert_metric(column);
    info!(n_gpus, rows = filled, column = THROUGHPUT, "derived throughput");
    Derivation::Added(filled)
}
