//! `grant-tracker inspect` — where the managed sections are and what they hold.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use tracker_docs::{inspect, resolve_document, InspectReport, LocateOrigin, SectionReport};

use super::{home, http_gateway, load_config};

/// Arguments for `grant-tracker inspect`.
#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Document URL or bare document id.
    pub document: String,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Tabled)]
struct SectionTableRow {
    #[tabled(rename = "section")]
    section: String,
    #[tabled(rename = "found via")]
    origin: String,
    #[tabled(rename = "span")]
    span: String,
    #[tabled(rename = "rows")]
    rows: usize,
}

#[derive(Tabled)]
struct FieldTableRow {
    #[tabled(rename = "label")]
    label: String,
    #[tabled(rename = "value")]
    value: String,
}

impl InspectArgs {
    pub fn run(self) -> Result<()> {
        let document_id = resolve_document(&self.document)?;
        let home = home()?;
        let config = load_config(&home)?;
        let gateway = http_gateway(&config, &home)?;

        let report = inspect(&gateway, &document_id)
            .with_context(|| format!("inspect failed for {}", document_id.masked()))?;

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("failed to serialize inspect report")?
            );
            return Ok(());
        }
        print_table(&report);
        Ok(())
    }
}

fn print_table(report: &InspectReport) {
    println!(
        "{} | revision {}",
        report.document_id.masked().bold(),
        report.revision_id.as_deref().unwrap_or("unknown"),
    );

    let rows: Vec<SectionTableRow> = report
        .sections
        .iter()
        .map(|section| SectionTableRow {
            section: section.section.to_string(),
            origin: origin_label(section),
            span: match (section.start, section.end) {
                (Some(start), Some(end)) => format!("[{start}, {end})"),
                _ => "-".to_string(),
            },
            rows: section.rows.len(),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");

    for section in report.sections.iter().filter(|s| !s.rows.is_empty()) {
        println!("{}", section.section.to_string().to_uppercase().bold());
        let fields: Vec<FieldTableRow> = section
            .rows
            .iter()
            .map(|row| FieldTableRow {
                label: row.label.clone(),
                value: row.value.clone(),
            })
            .collect();
        let mut table = Table::new(fields);
        table.with(Style::rounded());
        println!("{table}");
    }
}

fn origin_label(section: &SectionReport) -> String {
    match section.origin {
        Some(LocateOrigin::NamedRange) => section.range_name.green().to_string(),
        Some(LocateOrigin::LegacyTable) => "legacy table".yellow().to_string(),
        None => "missing".red().to_string(),
    }
}
