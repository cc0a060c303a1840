//! `grant-tracker provision` — sync a manifest of documents through the
//! scheduler, several documents at a time.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Deserialize;
use tabled::{settings::Style, Table, Tabled};

use tracker_core::{mask, GrantRecord};
use tracker_daemon::{DocumentScheduler, SyncJob};

use super::{home, http_gateway, load_config, outcome_label};

/// Arguments for `grant-tracker provision`.
#[derive(Args, Debug)]
pub struct ProvisionArgs {
    /// Manifest listing `{ document, grant, approvers }` entries.
    pub manifest: PathBuf,

    /// Override `provision_concurrency` from the config file.
    #[arg(long)]
    pub concurrency: Option<usize>,
}

/// ```yaml
/// approvers: [Ada Lovelace]      # optional, per-manifest default
/// jobs:
///   - document: https://docs.google.com/document/d/<id>/edit
///     grant: { ID: G-1, Title: ..., Amount: 50000 }
///     approvers: [Grace Hopper]  # optional, overrides the manifest default
/// ```
#[derive(Debug, Deserialize)]
struct Manifest {
    #[serde(default)]
    approvers: Option<Vec<String>>,
    jobs: Vec<ManifestEntry>,
}

#[derive(Debug, Deserialize)]
struct ManifestEntry {
    document: String,
    grant: GrantRecord,
    #[serde(default)]
    approvers: Option<Vec<String>>,
}

#[derive(Tabled)]
struct ProvisionTableRow {
    #[tabled(rename = "document")]
    document: String,
    #[tabled(rename = "metadata")]
    metadata: String,
    #[tabled(rename = "approvals")]
    approvals: String,
    #[tabled(rename = "error")]
    error: String,
}

impl ProvisionArgs {
    pub fn run(self) -> Result<()> {
        let manifest = load_manifest(&self.manifest)?;
        let home = home()?;
        let config = load_config(&home)?;
        let gateway = http_gateway(&config, &home)?;
        let concurrency = self.concurrency.unwrap_or(config.provision_concurrency);

        let fallback = manifest
            .approvers
            .clone()
            .unwrap_or_else(|| config.default_approvers.clone());
        let jobs: Vec<SyncJob> = manifest
            .jobs
            .into_iter()
            .map(|entry| SyncJob {
                document: entry.document,
                grant: entry.grant,
                approvers: entry.approvers.unwrap_or_else(|| fallback.clone()),
            })
            .collect();
        let total = jobs.len();

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .context("failed to start async runtime")?;
        let scheduler = DocumentScheduler::new(Arc::new(gateway), concurrency);
        let results = runtime.block_on(scheduler.run_all(jobs));

        let mut failed = 0;
        let rows: Vec<ProvisionTableRow> = results
            .into_iter()
            .map(|(document, result)| match result {
                Ok(report) => ProvisionTableRow {
                    document: report.document_id.masked(),
                    metadata: outcome_label(report.metadata),
                    approvals: outcome_label(report.approvals),
                    error: String::new(),
                },
                Err(err) => {
                    failed += 1;
                    ProvisionTableRow {
                        document: mask(document.trim()),
                        metadata: "-".to_string(),
                        approvals: "-".to_string(),
                        error: err.to_string().red().to_string(),
                    }
                }
            })
            .collect();

        if rows.is_empty() {
            println!("Manifest has no jobs.");
            return Ok(());
        }
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");

        if failed > 0 {
            bail!("{failed} of {total} documents failed to sync");
        }
        println!("{} {total} documents synced", "✓".green().bold());
        Ok(())
    }
}

fn load_manifest(path: &Path) -> Result<Manifest> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read manifest {}", path.display()))?;
    serde_yaml::from_str(&contents)
        .with_context(|| format!("failed to parse manifest {}", path.display()))
}
