//! metric-sync - Entry Point
//!
//! Exports every enabled framework, caches the merged datasets, prints the
//! alignment summary and writes the dashboard payloads as JSON lines.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use metric_sync::align::publish_rows;
use metric_sync::config::SyncConfig;
use metric_sync::export::{Exporter, FrameworkExport};
use metric_sync::fetch::FetchPool;
use metric_sync::remote::JsonDumpPlatform;

/// Reconstruct cadence-aligned metrics and republish them under one schema.
#[derive(Debug, Parser)]
#[command(name = "metric-sync", version, about)]
struct Cli {
    /// Config file (default: secrets/config.yaml, then config.yaml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory holding the JSON run dumps
    #[arg(long, default_value = "dumps")]
    dump_root: PathBuf,

    /// Ignore cached artifacts and export again
    #[arg(long)]
    refresh: bool,

    /// Directory for the dashboard payload files
    #[arg(long, default_value = "publish")]
    out_dir: PathBuf,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "metric_sync=debug,info"
    } else {
        "metric_sync=info,warn"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match run(&cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => {
            error!("no framework exported successfully");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("sync aborted: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &Cli) -> anyhow::Result<bool> {
    let config = match &cli.config {
        Some(path) => SyncConfig::load(path),
        None => SyncConfig::discover("."),
    }
    .context("failed to load configuration")?;
    info!(
        aligned = config.aligned_metrics.len(),
        frameworks = config.enabled_frameworks().count(),
        "configuration loaded"
    );

    let platform = Arc::new(JsonDumpPlatform::new(&cli.dump_root));
    let exporter = Exporter::new(platform)
        .with_pool(FetchPool::from(config.fetch))
        .with_rules(config.cadence_rules.clone());

    let exports = exporter.export_all(&config, cli.refresh).await;

    std::fs::create_dir_all(&cli.out_dir)
        .with_context(|| format!("cannot create {}", cli.out_dir.display()))?;
    for export in &exports {
        let Some(target) = config.frameworks.get(&export.name) else {
            continue;
        };
        if let Ok(dataset) = &export.outcome {
            let path = cli.out_dir.join(format!("{}.jsonl", target.target_exp_name));
            let rows = publish_rows(dataset, &export.mapping);
            write_payloads(&path, &rows)
                .with_context(|| format!("cannot write {}", path.display()))?;
            info!(
                framework = %export.name,
                project = %config.target.project,
                experiment = %target.target_exp_name,
                steps = rows.len(),
                "payloads written"
            );
        }
    }

    print_summary(&config, &exports);
    Ok(exports.iter().any(FrameworkExport::is_ok))
}

fn write_payloads<T: serde::Serialize>(path: &Path, rows: &[T]) -> anyhow::Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    for row in rows {
        serde_json::to_writer(&mut out, row)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(())
}

#[allow(clippy::print_stdout)]
fn print_summary(config: &SyncConfig, exports: &[FrameworkExport]) {
    println!("aligned metrics: {}", config.aligned_metrics.len());
    for export in exports {
        println!("\n[{}]", export.name.to_uppercase());
        match (&export.outcome, &export.report) {
            (Ok(dataset), Some(report)) => {
                println!("  rows: {}", dataset.num_rows());
                if let (Some(first), Some(last)) = (dataset.steps().first(), dataset.steps().last()) {
                    println!("  steps: {first} - {last}");
                }
                println!("  aligned: {}/{}", report.available.len(), report.total);
                for name in &report.missing {
                    println!("    - missing {name}");
                }
                report.log(&export.name);
            }
            (Err(e), _) => println!("  failed: {e}"),
            (Ok(_), None) => {}
        }
    }
}
