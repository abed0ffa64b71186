//! Artifact storage (Arrow/Parquet)
//!
//! A merged dataset leaves the pipeline as a single Arrow `RecordBatch`:
//!
//! | Column          | Type    | Nullable |
//! |-----------------|---------|----------|
//! | `step`          | UInt64  | no       |
//! | `<group>_id`    | UInt64  | yes      |
//! | metric columns  | Float64 | yes      |
//!
//! [`ArtifactCache`] persists that batch as Parquet so a later run can skip
//! the remote export. Artifacts are written whole; there is no incremental
//! update of a cached export.

use crate::catalog::CadenceGroup;
use crate::merge::{IdColumn, MergedDataset, STEP_COLUMN};
use crate::reconstruct::MetricColumn;
use crate::{Error, Result};
use arrow::array::{Array, ArrayRef, Float64Array, UInt64Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Schema metadata key recording the primary cadence group.
pub const PRIMARY_GROUP_KEY: &str = "metric_sync.primary";

/// Convert a merged dataset into an Arrow record batch.
///
/// # Errors
///
/// Returns error if the columns cannot form a valid batch
pub fn to_record_batch(dataset: &MergedDataset) -> Result<RecordBatch> {
    let mut fields = vec![Field::new(STEP_COLUMN, DataType::UInt64, false)];
    let mut arrays: Vec<ArrayRef> = vec![Arc::new(UInt64Array::from(dataset.steps().to_vec()))];

    for id in dataset.id_columns() {
        fields.push(Field::new(id.name(), DataType::UInt64, true));
        arrays.push(Arc::new(UInt64Array::from(id.values().to_vec())));
    }
    for metric in dataset.metrics() {
        fields.push(Field::new(metric.name(), DataType::Float64, true));
        arrays.push(Arc::new(Float64Array::from(metric.values().to_vec())));
    }

    let mut metadata = HashMap::new();
    if let Some(primary) = dataset.primary() {
        metadata.insert(PRIMARY_GROUP_KEY.to_string(), primary.as_str().to_string());
    }
    let schema = Arc::new(Schema::new_with_metadata(fields, metadata));

    RecordBatch::try_new(schema, arrays).map_err(Error::from)
}

/// Rebuild a merged dataset from an Arrow record batch.
///
/// Id columns are recognized by name; every other numeric column is read as
/// a nullable `Float64` metric column.
///
/// # Errors
///
/// Returns error if the `step` column is missing, contains nulls, or a
/// column cannot be cast to its target type
pub fn from_record_batch(batch: &RecordBatch) -> Result<MergedDataset> {
    let schema = batch.schema();
    let step_idx = schema.index_of(STEP_COLUMN).map_err(|_| {
        Error::StorageError(format!("Artifact has no '{STEP_COLUMN}' column"))
    })?;

    let steps = cast_u64(batch.column(step_idx))?;
    if steps.null_count() > 0 {
        return Err(Error::StorageError(format!(
            "Artifact '{STEP_COLUMN}' column contains nulls"
        )));
    }
    let steps: Vec<u64> = steps.values().to_vec();

    let mut ids = Vec::new();
    let mut metrics = Vec::new();
    for (i, field) in schema.fields().iter().enumerate() {
        if i == step_idx {
            continue;
        }
        let name = field.name();
        if let Some(group) = CadenceGroup::ALL.into_iter().find(|g| g.id_column() == name.as_str()) {
            let values = cast_u64(batch.column(i))?.iter().collect();
            ids.push(IdColumn::new(group, values));
        } else {
            let values = cast_f64(batch.column(i))?.iter().collect();
            metrics.push(MetricColumn::new(name.as_str(), values));
        }
    }

    let primary = schema
        .metadata()
        .get(PRIMARY_GROUP_KEY)
        .and_then(|p| CadenceGroup::ALL.into_iter().find(|g| g.as_str() == p.as_str()))
        .or_else(|| ids.first().map(IdColumn::group));

    Ok(MergedDataset::from_parts(primary, steps, ids, metrics))
}

fn cast_u64(array: &ArrayRef) -> Result<UInt64Array> {
    let cast = arrow::compute::cast(array, &DataType::UInt64)?;
    cast.as_any()
        .downcast_ref::<UInt64Array>()
        .cloned()
        .ok_or_else(|| Error::StorageError("Failed to read UInt64 column".to_string()))
}

fn cast_f64(array: &ArrayRef) -> Result<Float64Array> {
    let cast = arrow::compute::cast(array, &DataType::Float64)?;
    cast.as_any()
        .downcast_ref::<Float64Array>()
        .cloned()
        .ok_or_else(|| Error::StorageError("Failed to read Float64 column".to_string()))
}

/// Parquet cache for one framework's merged dataset.
#[derive(Debug, Clone)]
pub struct ArtifactCache {
    path: PathBuf,
}

impl ArtifactCache {
    /// Create a cache at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Artifact path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True if an artifact has been written.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Load the cached dataset.
    ///
    /// # Errors
    /// Returns error if file cannot be read or parsed
    pub fn load(&self) -> Result<MergedDataset> {
        use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
        use std::fs::File;

        let file = File::open(&self.path).map_err(|e| {
            Error::StorageError(format!("Failed to open Parquet file: {e}"))
        })?;

        let builder = ParquetRecordBatchReaderBuilder::try_new(file).map_err(|e| {
            Error::StorageError(format!("Failed to parse Parquet file: {e}"))
        })?;
        let schema = builder.schema().clone();

        let reader = builder.build().map_err(|e| {
            Error::StorageError(format!("Failed to create Parquet reader: {e}"))
        })?;

        let mut batches = Vec::new();
        for batch in reader {
            let batch = batch.map_err(|e| {
                Error::StorageError(format!("Failed to read record batch: {e}"))
            })?;
            batches.push(batch);
        }

        let batch = arrow::compute::concat_batches(&schema, &batches)?;
        let dataset = from_record_batch(&batch)?;
        debug!(path = %self.path.display(), rows = dataset.num_rows(), "loaded cached artifact");
        Ok(dataset)
    }

    /// Write `dataset` to the cache, replacing any previous artifact.
    ///
    /// # Errors
    /// Returns error if the file cannot be created or written
    pub fn store(&self, dataset: &MergedDataset) -> Result<()> {
        use parquet::arrow::ArrowWriter;
        use std::fs::File;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let batch = to_record_batch(dataset)?;
        let file = File::create(&self.path)?;
        let mut writer = ArrowWriter::try_new(file, batch.schema(), None)?;
        writer.write(&batch)?;
        writer.close()?;

        info!(path = %self.path.display(), rows = batch.num_rows(), "wrote artifact");
        Ok(())
    }
}
