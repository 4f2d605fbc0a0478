// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Reproducibility audit CLI
//!
//! Usage:
//!   repro-audit --runs 'runs/*.csv'
//!   repro-audit --runs 'runs/*.csv' --pipeline P1 --view models
//!   repro-audit --synthetic --seed 42 --format all

use anyhow::Result;
use clap::Parser;
use repro_audit::pipeline::{AuditConfig, AuditPipeline};
use repro_audit::report::{format_condition_table, format_model_table, format_violations};
use repro_audit::synthetic::{self, SyntheticConfig};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "repro-audit")]
#[command(about = "Measure label and score stability across repeated model runs")]
#[command(version)]
struct Args {
    /// Glob patterns selecting run batches (repeatable)
    #[arg(short, long)]
    runs: Vec<String>,

    /// JSON config file; command-line flags override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Restrict the per-model view to one pipeline (e.g. P1)
    #[arg(short, long)]
    pipeline: Option<String>,

    /// Models that must be reported even without runs (comma-separated)
    #[arg(long)]
    expected_models: Option<String>,

    /// Views to print (conditions, models, both)
    #[arg(long, default_value = "both")]
    view: String,

    /// Output directory for saved results
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format (text, json, markdown, all)
    #[arg(short, long, default_value = "text")]
    format: String,

    /// Audit a generated batch instead of loading runs from disk
    #[arg(long)]
    synthetic: bool,

    /// Seed for the synthetic batch
    #[arg(short, long, default_value_t = 42)]
    seed: u64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = match args.config {
        Some(ref path) => AuditConfig::from_json_file(path)?,
        None => AuditConfig::default(),
    };
    if !args.runs.is_empty() {
        config.run_patterns = args.runs.clone();
    }
    if args.pipeline.is_some() {
        config.pipeline_filter = args.pipeline.clone();
    }
    if let Some(ref models) = args.expected_models {
        config.expected_models = models.split(',').map(|s| s.trim().to_string()).collect();
    }
    if let Some(ref output) = args.output {
        config.output_dir = output.to_string_lossy().to_string();
    }

    tracing::info!("Reproducibility Audit");
    tracing::info!("Run patterns: {:?}", config.run_patterns);
    tracing::info!("Pipeline filter: {}", config.pipeline_filter.as_deref().unwrap_or("none"));

    let mut pipeline = if args.synthetic {
        let synthetic_config = SyntheticConfig {
            seed: args.seed,
            flip_probability: 0.15,
            bad_score_probability: 0.1,
            prompt_drift_probability: 0.02,
            ..SyntheticConfig::default()
        };
        tracing::info!("Using synthetic runs (seed={})", args.seed);
        AuditPipeline::with_records(config, synthetic::generate(&synthetic_config))
    } else {
        AuditPipeline::new(config)
    };
    let results = pipeline.run()?;

    if args.view == "conditions" || args.view == "both" {
        println!("\n=== Stability by condition and pipeline ({}) ===", results.config.condition_policy.name());
        println!("{}", format_condition_table(&results.condition_metrics));
    }

    if args.view == "models" || args.view == "both" {
        let scope = results.config.pipeline_filter.as_deref().unwrap_or("all pipelines");
        println!(
            "\n=== Per-model stability metrics ({}, {}) ===",
            scope,
            results.config.model_policy.name()
        );
        println!("{}", format_model_table(&results.model_metrics));
    }

    println!("\n{}", format_violations(&results.prompt_hash_violations));

    let output_dir = PathBuf::from(&results.config.output_dir);
    let timestamp = results.timestamp.format("%Y%m%d_%H%M%S");

    if args.format == "json" || args.format == "all" {
        let json_path = output_dir.join(format!("audit_{}.json", timestamp));
        AuditPipeline::save_results(&results, &json_path)?;
        println!("\nJSON results saved to: {}", json_path.display());
    }

    if args.format == "markdown" || args.format == "all" {
        std::fs::create_dir_all(&output_dir)?;
        let md_path = output_dir.join(format!("audit_{}.md", timestamp));
        std::fs::write(&md_path, AuditPipeline::generate_report(&results))?;
        println!("Markdown report saved to: {}", md_path.display());
    }

    Ok(())
}
