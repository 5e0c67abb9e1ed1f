//! Maintenance commands for fieldsync data directories.
//!
//! The binary operates on store and server directories directly, without a
//! running sync process:
//!
//! - `inspect` - Statistics and metadata for a store or server
//! - `outbox` - Queued outbox entries of a store
//! - `log` - Retained change records of a server
//! - `compact` - Rewrite a store journal to drop dead frames
//! - `sweep` - Purge server change records past the retention window

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

type CliResult = Result<(), Box<dyn std::error::Error>>;

/// Fieldsync command-line maintenance tools.
#[derive(Parser)]
#[command(name = "fieldsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Data directory to operate on
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Log at debug level
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display store or server statistics and metadata
    Inspect {
        /// Show per-table record counts
        #[arg(short, long)]
        tables: bool,

        /// Output as "text" or "json"
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// List a store's queued outbox entries
    Outbox {
        /// Include acknowledged entries
        #[arg(short, long)]
        all: bool,

        /// Output as "text" or "json"
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// List a server's retained change records
    Log {
        /// Start after this change-log version
        #[arg(short, long, default_value = "0")]
        since: u64,

        /// Stop after this many records
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output as "text" or "json"
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Rewrite a store journal to drop dead frames
    Compact {
        /// Report what would change without touching the journal
        #[arg(short, long)]
        dry_run: bool,
    },

    /// Purge server change records past the retention window
    Sweep {
        /// Retention window in days
        #[arg(short, long, default_value = "30")]
        retention_days: u64,

        /// Report what would change without touching the log
        #[arg(short, long)]
        dry_run: bool,
    },

    /// Print CLI and protocol versions
    Version,
}

fn main() -> CliResult {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Inspect { tables, format } => {
            commands::inspect::run(&require_path(cli.path, "inspect")?, tables, &format)?;
        }
        Commands::Outbox { all, format } => {
            commands::outbox::run(&require_path(cli.path, "outbox")?, all, &format)?;
        }
        Commands::Log {
            since,
            limit,
            format,
        } => {
            commands::log::run(&require_path(cli.path, "log")?, since, limit, &format)?;
        }
        Commands::Compact { dry_run } => {
            commands::compact::run(&require_path(cli.path, "compact")?, dry_run)?;
        }
        Commands::Sweep {
            retention_days,
            dry_run,
        } => {
            commands::sweep::run(&require_path(cli.path, "sweep")?, retention_days, dry_run)?;
        }
        Commands::Version => {
            println!("Fieldsync CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Fieldsync protocol v{}", fieldsync_protocol::VERSION);
        }
    }

    Ok(())
}

/// `RUST_LOG` wins when set; otherwise `--verbose` picks debug over info.
fn init_logging(verbose: bool) {
    let fallback = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn require_path(path: Option<PathBuf>, command: &str) -> Result<PathBuf, String> {
    path.ok_or_else(|| format!("the {command} command needs --path <DIR>"))
}
