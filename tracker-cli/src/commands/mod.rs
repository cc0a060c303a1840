pub mod daemon;
pub mod diff;
pub mod inspect;
pub mod provision;
pub mod sync;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use colored::Colorize;

use tracker_core::{config, GrantRecord, TrackerConfig};
use tracker_docs::{HttpDocsGateway, SectionOutcome};

pub(crate) fn home() -> Result<PathBuf> {
    dirs::home_dir().context("could not determine home directory")
}

pub(crate) fn load_config(home: &Path) -> Result<TrackerConfig> {
    config::load_at(home).context("failed to load ~/.grant-tracker/config.yaml")
}

pub(crate) fn http_gateway(config: &TrackerConfig, home: &Path) -> Result<HttpDocsGateway> {
    HttpDocsGateway::from_config(config, home).context("cannot reach the document service")
}

/// Read one grant row from a YAML (or JSON) file.
pub(crate) fn load_grant(path: &Path) -> Result<GrantRecord> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read grant file {}", path.display()))?;
    serde_yaml::from_str(&contents)
        .with_context(|| format!("failed to parse grant file {}", path.display()))
}

pub(crate) fn outcome_label(outcome: SectionOutcome) -> String {
    match outcome {
        SectionOutcome::Created => "created".green().to_string(),
        SectionOutcome::Recreated => "recreated".green().to_string(),
        SectionOutcome::Preserved => "preserved".bright_black().to_string(),
        SectionOutcome::Skipped => "skipped".bright_black().to_string(),
    }
}
