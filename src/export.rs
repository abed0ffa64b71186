//! Export pipeline
//!
//! ```text
//! catalog ──> fetch (per group, per metric) ──> reconstruct ──> merge ──> throughput
//! ```
//!
//! One [`Exporter`] runs the pipeline for any number of experiments. Each
//! experiment is independent: a fatal error in one leaves the others
//! untouched.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{error, info, info_span, warn, Instrument};

use crate::align::{AlignmentReport, MetricMapping};
use crate::catalog::{CadenceRules, MetricCatalog};
use crate::config::{FrameworkConfig, Platform, SyncConfig};
use crate::fetch::FetchPool;
use crate::merge::MergedDataset;
use crate::reconstruct::DenseTable;
use crate::remote::ExperimentPlatform;
use crate::storage::ArtifactCache;
use crate::throughput::derive_throughput;
use crate::Result;

/// Runs the reconstruction pipeline against one platform.
pub struct Exporter<P> {
    platform: Arc<P>,
    pool: FetchPool,
    rules: CadenceRules,
}

impl<P> Exporter<P>
where
    P: ExperimentPlatform + 'static,
{
    /// Create an exporter with the default pool and cadence rules.
    #[must_use]
    pub fn new(platform: Arc<P>) -> Self {
        Self {
            platform,
            pool: FetchPool::default(),
            rules: CadenceRules::default(),
        }
    }

    /// Use `pool` for metric fetches.
    #[must_use]
    pub fn with_pool(mut self, pool: FetchPool) -> Self {
        self.pool = pool;
        self
    }

    /// Use `rules` for cadence classification.
    #[must_use]
    pub fn with_rules(mut self, rules: CadenceRules) -> Self {
        self.rules = rules;
        self
    }

    /// Export one experiment into a merged dataset.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::RemoteQuery`] if the metric catalog cannot be
    /// listed. Individual metric failures are absorbed as empty columns.
    pub async fn export(&self, handle: &str, n_gpus: Option<u32>) -> Result<MergedDataset> {
        let catalog = MetricCatalog::resolve(self.platform.as_ref(), handle, &self.rules).await?;

        let mut tables = Vec::new();
        for (group, metrics) in catalog.groups() {
            let series = self
                .pool
                .fetch_group(&self.platform, handle, metrics)
                .instrument(info_span!("fetch_group", %group))
                .await;
            let table = DenseTable::reconstruct(group, &series);
            info!(%group, rows = table.num_rows(), columns = table.columns().len(), "group reconstructed");
            tables.push(table);
        }

        let mut dataset = MergedDataset::merge(tables);
        derive_throughput(&mut dataset, n_gpus);
        Ok(dataset)
    }

    /// Export a configured framework, going through its artifact cache.
    ///
    /// A present artifact is reused unless `refresh` is set; a fresh export
    /// is written back to the cache.
    ///
    /// # Errors
    ///
    /// Returns error if the export fails or the cache cannot be read/written
    pub async fn export_framework(
        &self,
        framework: &FrameworkConfig,
        refresh: bool,
    ) -> Result<MergedDataset> {
        let cache = ArtifactCache::new(&framework.output_file);
        if cache.exists() && !refresh {
            info!(path = %cache.path().display(), "using cached artifact");
            return cache.load();
        }

        info!(handle = %framework.experiment_handle, "exporting run");
        let dataset = self
            .export(&framework.experiment_handle, framework.n_gpus)
            .await?;
        cache.store(&dataset)?;
        Ok(dataset)
    }

    /// Export every enabled framework of `config`.
    ///
    /// Frameworks are processed sequentially in name order. Frameworks on a
    /// platform without reconstruction support are skipped with a warning.
    pub async fn export_all(&self, config: &SyncConfig, refresh: bool) -> Vec<FrameworkExport> {
        let mut results = Vec::new();
        for (name, framework) in config.enabled_frameworks() {
            if framework.platform != Platform::Wandb {
                warn!(framework = name, platform = ?framework.platform, "unsupported platform, skipping");
                continue;
            }

            let outcome = self
                .export_framework(framework, refresh)
                .instrument(info_span!("framework", name))
                .await;
            if let Err(e) = &outcome {
                error!(framework = name, error = %e, "export failed");
            }

            let mapping = MetricMapping::resolve(framework.mapping.as_ref(), &config.aligned_metrics);
            results.push(FrameworkExport {
                name: name.to_string(),
                exported_at: Utc::now(),
                report: outcome
                    .as_ref()
                    .ok()
                    .map(|d| AlignmentReport::check(d, &config.aligned_metrics, &mapping)),
                mapping,
                outcome,
            });
        }
        results
    }
}

/// Result of exporting one framework.
#[derive(Debug)]
pub struct FrameworkExport {
    /// Framework name
    pub name: String,
    /// Completion time
    pub exported_at: DateTime<Utc>,
    /// Effective metric mapping
    pub mapping: MetricMapping,
    /// Alignment coverage, for successful exports
    pub report: Option<AlignmentReport>,
    /// Dataset or fatal error
    pub outcome: Result<MergedDataset>,
}

impl FrameworkExport {
    /// True if the export produced a dataset.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }
}

