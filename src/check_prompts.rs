// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Standalone prompt-hash consistency check
//!
//! Lists every (model, article) pair whose repeated runs were sent different
//! prompts. Exits non-zero only when `--strict` is set and violations exist.

use anyhow::Result;
use clap::Parser;
use repro_audit::consistency::ConsistencyChecker;
use repro_audit::loader::{RunRecordLoader, DEFAULT_PATTERN};
use repro_audit::report::format_violations;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "check-prompts")]
#[command(about = "Check that repeated runs used identical prompts")]
#[command(version)]
struct Args {
    /// Glob patterns selecting run batches (repeatable)
    #[arg(short, long, default_value = DEFAULT_PATTERN)]
    runs: Vec<String>,

    /// Only check runs of this pipeline
    #[arg(short, long)]
    pipeline: Option<String>,

    /// Exit with an error if any violation is found
    #[arg(long)]
    strict: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut records = RunRecordLoader::new(args.runs.iter().cloned()).load()?;
    if let Some(ref pipeline) = args.pipeline {
        records.retain(|r| &r.pipeline == pipeline);
        tracing::info!("Checking {} records from pipeline {}", records.len(), pipeline);
    }

    let violations = ConsistencyChecker::new().check(&records);
    println!("{}", format_violations(&violations));

    if args.strict && !violations.is_empty() {
        anyhow::bail!("{} (model, article) pairs have inconsistent prompt_hash", violations.len());
    }

    Ok(())
}
