//! `grant-tracker sync` — project one grant into one document.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use tracker_daemon::request_sync;
use tracker_docs::{resolve_document, sync_grant_to_doc, SyncReport};

use super::{home, http_gateway, load_config, load_grant, outcome_label};

/// Arguments for `grant-tracker sync`.
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Document URL or bare document id.
    pub document: String,

    /// YAML or JSON file holding one Grants row.
    #[arg(long, value_name = "FILE")]
    pub grant: PathBuf,

    /// Approver name, in order. Repeat for several; defaults to the configured list.
    #[arg(long = "approver", value_name = "NAME")]
    pub approvers: Vec<String>,

    /// Hand the sync to a running daemon instead of syncing in-process.
    #[arg(long)]
    pub daemon: bool,

    /// Emit the sync report as JSON.
    #[arg(long)]
    pub json: bool,
}

impl SyncArgs {
    pub fn run(self) -> Result<()> {
        let document_id = resolve_document(&self.document)?;
        let grant = load_grant(&self.grant)?;
        let home = home()?;

        let report = if self.daemon {
            let approvers = (!self.approvers.is_empty()).then(|| self.approvers.clone());
            request_sync(&home, &self.document, &grant, approvers)
                .context("daemon sync failed")?
        } else {
            let config = load_config(&home)?;
            let approvers = if self.approvers.is_empty() {
                config.default_approvers.clone()
            } else {
                self.approvers.clone()
            };
            let gateway = http_gateway(&config, &home)?;
            sync_grant_to_doc(&gateway, &self.document, &grant, &approvers)
                .with_context(|| format!("sync failed for {}", document_id.masked()))?
        };

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("failed to serialize sync report")?
            );
        } else {
            print_report(&grant.id.0, &report);
        }
        Ok(())
    }
}

fn print_report(grant_id: &str, report: &SyncReport) {
    println!(
        "{} grant '{}' → {}",
        "✓".green().bold(),
        grant_id,
        report.document_id.masked()
    );
    println!("  metadata   {}", outcome_label(report.metadata));
    println!("  approvals  {}", outcome_label(report.approvals));
}
