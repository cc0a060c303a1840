//! `grant-tracker diff` — preview the Metadata change without writing.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use tracker_docs::{diff_metadata, resolve_document};

use super::{home, http_gateway, load_config, load_grant};

/// Arguments for `grant-tracker diff`.
#[derive(Args, Debug)]
pub struct DiffArgs {
    /// Document URL or bare document id.
    pub document: String,

    /// YAML or JSON file holding one Grants row.
    #[arg(long, value_name = "FILE")]
    pub grant: PathBuf,
}

impl DiffArgs {
    pub fn run(self) -> Result<()> {
        let document_id = resolve_document(&self.document)?;
        let grant = load_grant(&self.grant)?;
        let home = home()?;
        let config = load_config(&home)?;
        let gateway = http_gateway(&config, &home)?;

        let diff = diff_metadata(&gateway, &document_id, &grant)
            .with_context(|| format!("diff failed for {}", document_id.masked()))?;

        if diff.is_empty() {
            println!("No differences for '{}'.", document_id.masked());
            return Ok(());
        }

        print!("{diff}");
        if !diff.ends_with('\n') {
            println!();
        }
        Ok(())
    }
}
