//! grant-tracker: keep the managed sections of grant documents in step with
//! the Grants sheet.
//!
//! # Usage
//!
//! ```text
//! grant-tracker sync <document> --grant <grant.yaml> [--approver <name>]... [--daemon] [--json]
//! grant-tracker diff <document> --grant <grant.yaml>
//! grant-tracker inspect <document> [--json]
//! grant-tracker provision <manifest.yaml>
//! grant-tracker daemon start|stop|status
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    daemon::DaemonCommand, diff::DiffArgs, inspect::InspectArgs, provision::ProvisionArgs,
    sync::SyncArgs,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "grant-tracker",
    version,
    about = "Sync grant records into the managed sections of tracker documents",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a grant's Metadata section (and Approvals, if missing) into a document.
    Sync(SyncArgs),

    /// Show a unified diff of what sync would change in the Metadata table.
    Diff(DiffArgs),

    /// Show where the managed sections of a document are.
    Inspect(InspectArgs),

    /// Sync every entry of a manifest, several documents at a time.
    Provision(ProvisionArgs),

    /// Manage the background sync daemon.
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    if !matches!(cli.command, Commands::Daemon { .. }) {
        init_tracing();
    }
    match cli.command {
        Commands::Sync(args) => args.run(),
        Commands::Diff(args) => args.run(),
        Commands::Inspect(args) => args.run(),
        Commands::Provision(args) => args.run(),
        Commands::Daemon { command } => commands::daemon::run(command),
    }
}

const DEFAULT_LOG_FILTER: &str = "info";

/// Library logs go to stderr so command output stays parseable.
fn init_tracing() {
    use tracing_subscriber::fmt;

    let filter = log_filter(std::env::var("RUST_LOG").ok().as_deref());
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

/// `RUST_LOG` when it parses, `info` otherwise.
fn log_filter(directives: Option<&str>) -> tracing_subscriber::EnvFilter {
    use tracing_subscriber::EnvFilter;

    directives
        .filter(|d| !d.trim().is_empty())
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER))
}
