//! Sync configuration
//!
//! Loaded from YAML. Without an explicit path the first existing file of
//! [`DEFAULT_CONFIG_PATHS`] is used.
//!
//! ```yaml
//! aligned_metrics: ["loss", "reward"]
//! target:
//!   project: framework-comparison
//! frameworks:
//!   slime:
//!     enabled: true
//!     platform: wandb
//!     run_path: team/project/abc123
//!     target_exp_name: slime-baseline
//!     output_file: data/slime.parquet
//!     n_gpus: 8
//!     mapping:
//!       train/loss: loss
//!       rollout/raw_reward: reward
//!       train/grad_norm: null
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::catalog::CadenceRules;
use crate::fetch::FetchSettings;
use crate::{Error, Result};

/// Config file locations searched in order.
pub const DEFAULT_CONFIG_PATHS: [&str; 2] = ["secrets/config.yaml", "config.yaml"];

/// Tracking platform a framework logged to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Per-metric histories, reconstructed by cadence group
    Wandb,
    /// Already-aligned tabular export (not handled by this tool)
    Swanlab,
}

/// Per-framework settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameworkConfig {
    /// Whether to export this framework
    #[serde(default)]
    pub enabled: bool,
    /// Source platform
    pub platform: Platform,
    /// Run handle on the source platform
    #[serde(alias = "run_path", alias = "exp_id")]
    pub experiment_handle: String,
    /// Source metric name to aligned name; `null` drops the metric
    #[serde(default)]
    pub mapping: Option<BTreeMap<String, Option<String>>>,
    /// GPU count for throughput derivation
    #[serde(default)]
    pub n_gpus: Option<u32>,
    /// Experiment name on the comparison dashboard
    pub target_exp_name: String,
    /// Artifact cache path
    pub output_file: PathBuf,
}

/// Comparison dashboard settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Dashboard project
    pub project: String,
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Canonical metric names every framework should provide
    pub aligned_metrics: Vec<String>,
    /// Frameworks by name
    pub frameworks: BTreeMap<String, FrameworkConfig>,
    /// Publishing target
    pub target: TargetConfig,
    /// Fetch pool settings
    #[serde(default)]
    pub fetch: FetchSettings,
    /// Cadence classification table
    #[serde(default)]
    pub cadence_rules: CadenceRules,
}

impl SyncConfig {
    /// Parse and validate a YAML document.
    ///
    /// # Errors
    ///
    /// Returns error if the YAML is malformed or fails validation
    pub fn from_yaml(text: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read, parsed or validated
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        debug!(path = %path.display(), "loading configuration");
        Self::from_yaml(&text)
    }

    /// Load from the first existing default location below `dir`.
    ///
    /// # Errors
    ///
    /// Returns error if no config file exists or it fails to load
    pub fn discover(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let path = DEFAULT_CONFIG_PATHS
            .iter()
            .map(|p| dir.join(p))
            .find(|p| p.is_file())
            .ok_or_else(|| {
                Error::Config(format!(
                    "no config file found, expected one of: {}",
                    DEFAULT_CONFIG_PATHS.join(", ")
                ))
            })?;
        Self::load(path)
    }

    /// Check cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first violation
    pub fn validate(&self) -> Result<()> {
        if self.enabled_frameworks().next().is_none() {
            return Err(Error::Config(
                "no framework is enabled, enable at least one under 'frameworks'".to_string(),
            ));
        }
        if self.fetch.max_workers == 0 {
            return Err(Error::Config("fetch.max_workers must be positive".to_string()));
        }
        for (name, framework) in &self.frameworks {
            if framework.n_gpus == Some(0) {
                return Err(Error::Config(format!(
                    "framework '{name}': n_gpus must be positive"
                )));
            }
            if framework.experiment_handle.trim().is_empty() {
                return Err(Error::Config(format!(
                    "framework '{name}': experiment handle is empty"
                )));
            }
        }
        Ok(())
    }

    /// Enabled frameworks in name order.
    pub fn enabled_frameworks(&self) -> impl Iterator<Item = (&str, &FrameworkConfig)> {
        self.frameworks
            .iter()
            .filter(|(_, f)| f.enabled)
            .map(|(n, f)| (n.as_str(), f))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r"
aligned_metrics: [loss, reward]
target:
  project: comparison
frameworks:
  slime:
    enabled: true
    platform: wandb
    run_path: team/proj/run1
    target_exp_name: slime
    output_file: data/slime.parquet
    n_gpus: 8
    mapping:
      train/loss: loss
      train/grad_norm: null
  verl:
    platform: swanlab
    exp_id: abc
    target_exp_name: verl
    output_file: data/verl.parquet
";

    #[test]
    fn test_parse_config() {
        let config = SyncConfig::from_yaml(CONFIG).unwrap();
        assert_eq!(config.aligned_metrics, vec!["loss", "reward"]);
        assert_eq!(config.target.project, "comparison");

        let slime = &config.frameworks["slime"];
        assert_eq!(slime.platform, Platform::Wandb);
        assert_eq!(slime.experiment_handle, "team/proj/run1");
        assert_eq!(slime.n_gpus, Some(8));
        let mapping = slime.mapping.as_ref().unwrap();
        assert_eq!(mapping["train/loss"].as_deref(), Some("loss"));
        assert_eq!(mapping["train/grad_norm"], None);

        let verl = &config.frameworks["verl"];
        assert!(!verl.enabled);
        assert_eq!(verl.experiment_handle, "abc");
        assert!(verl.mapping.is_none());

        assert_eq!(config.fetch, FetchSettings::default());
        assert_eq!(config.cadence_rules, CadenceRules::default());
    }

    #[test]
    fn test_enabled_frameworks() {
        let config = SyncConfig::from_yaml(CONFIG).unwrap();
        let names: Vec<&str> = config.enabled_frameworks().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["slime"]);
    }

    #[test]
    fn test_no_enabled_framework_rejected() {
        let text = CONFIG.replace("enabled: true", "enabled: false");
        let err = SyncConfig::from_yaml(&text).unwrap_err();
        assert!(err.to_string().contains("no framework is enabled"));
    }

    #[test]
    fn test_zero_gpus_rejected() {
        let text = CONFIG.replace("n_gpus: 8", "n_gpus: 0");
        let err = SyncConfig::from_yaml(&text).unwrap_err();
        assert!(err.to_string().contains("n_gpus must be positive"));
    }

    #[test]
    fn test_missing_section_is_yaml_error() {
        let err = SyncConfig::from_yaml("aligned_metrics: []\n").unwrap_err();
        assert!(matches!(err, Error::Yaml(_)));
    }

    #[test]
    fn test_discover_prefers_secrets() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("secrets")).unwrap();
        std::fs::write(dir.path().join("secrets/config.yaml"), CONFIG).unwrap();
        std::fs::write(
            dir.path().join("config.yaml"),
            CONFIG.replace("project: comparison", "project: other"),
        )
        .unwrap();

        let config = SyncConfig::discover(dir.path()).unwrap();
        assert_eq!(config.target.project, "comparison");
    }

    #[test]
    fn test_discover_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = SyncConfig::discover(dir.path()).unwrap_err();
        assert!(err.to_string().contains("no config file found"));
    }
}
