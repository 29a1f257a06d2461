//! Merge two seed JSON files into one, repairing the existing side.
//!
//! The existing seed may come from an older producer and is repaired
//! record by record; the incoming seed must be fully valid. The result is
//! written atomically.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use harvester_core::merge_seed_files;
use tracing::{info, warn};

/// Merge an incoming seed file into an existing one.
#[derive(Parser, Debug)]
#[command(name = "merge-seeds")]
#[command(author, version, about)]
struct Args {
    /// The existing seed file (missing file treated as empty)
    existing: PathBuf,

    /// The incoming seed file (must be fully valid)
    incoming: PathBuf,

    /// Path for the merged seed
    #[arg(long)]
    out: PathBuf,

    /// Resolve id collisions in favor of the incoming seed
    #[arg(long)]
    prefer_new: bool,

    /// Suppress non-error output
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.quiet { "error" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let report = merge_seed_files(&args.existing, &args.incoming, &args.out, args.prefer_new)
        .context("merge failed")?;

    if !report.dropped_ids.is_empty() {
        warn!(
            dropped = report.dropped_ids.len(),
            ids = %report.dropped_ids.join(", "),
            "invalid existing questions were dropped"
        );
    }
    info!(
        added = report.added,
        replaced = report.replaced,
        total = report.merged.questions.len(),
        out = %args.out.display(),
        "merge written"
    );

    Ok(())
}
