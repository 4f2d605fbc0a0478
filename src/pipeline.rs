// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Reproducibility audit pipeline
//!
//! Orchestrates:
//! - Run batch loading
//! - Pipeline filtering for the per-model view
//! - Both aggregation views
//! - Prompt-hash consistency check
//! - Results serialization and markdown reporting

use crate::consistency::{ConsistencyChecker, ConsistencyViolation};
use crate::loader::{RunRecordLoader, DEFAULT_PATTERN};
use crate::metrics::{ConditionPipelineMetrics, DispersionPolicy, MetricsAggregator, ModelMetrics};
use crate::records::RunRecord;
use crate::report::{format_metric, NOT_AVAILABLE};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

/// Configuration for an audit run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Glob patterns selecting run batches
    pub run_patterns: Vec<String>,
    /// Restrict the per-model view and consistency check to one pipeline
    pub pipeline_filter: Option<String>,
    /// Models that must appear in the per-model view even without runs
    pub expected_models: Vec<String>,
    pub condition_policy: DispersionPolicy,
    pub model_policy: DispersionPolicy,
    /// Output directory for results
    pub output_dir: String,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            run_patterns: vec![DEFAULT_PATTERN.to_string()],
            pipeline_filter: None,
            expected_models: vec![],
            condition_policy: DispersionPolicy::ZeroFill,
            model_policy: DispersionPolicy::SkipMissing,
            output_dir: "results".to_string(),
        }
    }
}

impl AuditConfig {
    /// Read a JSON config file; absent keys take their defaults
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordInfo {
    pub total_records: usize,
    pub model_view_records: usize,
    pub models: usize,
    pub articles: usize,
    pub unparsable_scores: usize,
    pub missing_labels: usize,
    pub source_files: Vec<String>,
}

impl RecordInfo {
    fn describe(records: &[RunRecord], model_view_records: usize) -> Self {
        let models: BTreeSet<&str> = records.iter().map(|r| r.model_name.as_str()).collect();
        let articles: BTreeSet<&str> = records.iter().map(|r| r.article_id.as_str()).collect();
        let sources: BTreeSet<String> = records
            .iter()
            .filter_map(|r| r.source_file.as_ref())
            .map(|p| p.display().to_string())
            .collect();

        Self {
            total_records: records.len(),
            model_view_records,
            models: models.len(),
            articles: articles.len(),
            unparsable_scores: records.iter().filter(|r| r.score().is_none()).count(),
            missing_labels: records.iter().filter(|r| r.label().is_none()).count(),
            source_files: sources.into_iter().collect(),
        }
    }
}

/// Complete audit results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditResults {
    pub config: AuditConfig,
    pub record_info: RecordInfo,
    pub condition_metrics: Vec<ConditionPipelineMetrics>,
    pub model_metrics: Vec<ModelMetrics>,
    pub prompt_hash_violations: Vec<ConsistencyViolation>,
    pub timestamp: DateTime<Utc>,
    pub version: String,
}

/// Main audit pipeline
pub struct AuditPipeline {
    config: AuditConfig,
    records: Option<Vec<RunRecord>>,
}

impl AuditPipeline {
    pub fn new(config: AuditConfig) -> Self {
        Self { config, records: None }
    }

    /// Pipeline over records that are already in memory
    pub fn with_records(config: AuditConfig, records: Vec<RunRecord>) -> Self {
        Self {
            config,
            records: Some(records),
        }
    }

    pub fn config(&self) -> &AuditConfig {
        &self.config
    }

    /// Load run batches based on configuration
    pub fn load_records(&mut self) -> Result<()> {
        let loader = RunRecordLoader::new(self.config.run_patterns.iter().cloned());
        let records = loader.load().context("Failed to load run batches")?;
        self.records = Some(records);
        Ok(())
    }

    fn records(&self) -> &[RunRecord] {
        self.records.as_deref().unwrap_or(&[])
    }

    /// Records selected for the per-model view
    fn model_view_records(&self) -> Vec<RunRecord> {
        match &self.config.pipeline_filter {
            Some(pipeline) => self
                .records()
                .iter()
                .filter(|r| &r.pipeline == pipeline)
                .cloned()
                .collect(),
            None => self.records().to_vec(),
        }
    }

    /// Run the full audit
    pub fn run(&mut self) -> Result<AuditResults> {
        if self.records.is_none() {
            self.load_records()?;
        }

        let condition_aggregator = MetricsAggregator::new(self.config.condition_policy);
        let condition_metrics = condition_aggregator.by_condition_pipeline(self.records());
        tracing::info!(
            "Computed {} (condition, pipeline) groups ({})",
            condition_metrics.len(),
            self.config.condition_policy.name()
        );

        let model_records = self.model_view_records();
        if let Some(ref pipeline) = self.config.pipeline_filter {
            tracing::info!(
                "Per-model view restricted to pipeline {}: {} of {} records",
                pipeline,
                model_records.len(),
                self.records().len()
            );
        }

        let model_aggregator = MetricsAggregator::new(self.config.model_policy);
        let model_metrics = model_aggregator.by_model_with_expected(&model_records, &self.config.expected_models);
        for result in &model_metrics {
            tracing::info!(
                "  {} - articles: {}, mean_ERR: {}, median_std: {}, flip_rate: {}",
                result.model_name,
                result.summary.articles,
                format_metric(result.summary.mean_err),
                format_metric(result.summary.median_std),
                format_metric(result.flip_rate)
            );
        }

        let prompt_hash_violations = ConsistencyChecker::new().check(&model_records);

        Ok(AuditResults {
            config: self.config.clone(),
            record_info: RecordInfo::describe(self.records(), model_records.len()),
            condition_metrics,
            model_metrics,
            prompt_hash_violations,
            timestamp: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        })
    }

    /// Save results to JSON file
    pub fn save_results(results: &AuditResults, output_path: &Path) -> Result<()> {
        std::fs::create_dir_all(output_path.parent().unwrap_or(Path::new(".")))?;
        let json = serde_json::to_string_pretty(results)?;
        std::fs::write(output_path, json)?;
        tracing::info!("Results saved to {}", output_path.display());
        Ok(())
    }

    /// Generate a markdown report
    pub fn generate_report(results: &AuditResults) -> String {
        let mut report = String::new();

        report.push_str("# Reproducibility Audit Report\n\n");
        report.push_str(&format!("**Generated:** {}\n\n", results.timestamp.format("%Y-%m-%d %H:%M:%S UTC")));
        report.push_str(&format!("**Version:** {}\n\n", results.version));

        let info = &results.record_info;
        report.push_str("## Records\n\n");
        report.push_str(&format!("- **Total Records:** {}\n", info.total_records));
        report.push_str(&format!("- **Models:** {}\n", info.models));
        report.push_str(&format!("- **Articles:** {}\n", info.articles));
        report.push_str(&format!("- **Unparsable Scores:** {}\n", info.unparsable_scores));
        report.push_str(&format!("- **Missing Labels:** {}\n", info.missing_labels));
        report.push_str(&format!("- **Batches:** {}\n\n", info.source_files.len()));

        report.push_str("## Stability by Condition and Pipeline\n\n");
        report.push_str(&format!(
            "*Dispersion policy: {}*\n\n",
            results.config.condition_policy.name()
        ));
        report.push_str("| Condition | Pipeline | mean_ERR | median_std | Articles |\n");
        report.push_str("|-----------|----------|----------|------------|----------|\n");
        for row in &results.condition_metrics {
            report.push_str(&format!(
                "| {} | {} | {} | {} | {} |\n",
                row.condition,
                row.pipeline,
                format_metric(row.summary.mean_err),
                format_metric(row.summary.median_std),
                row.summary.articles
            ));
        }

        report.push_str("\n## Stability by Model\n\n");
        let scope = results.config.pipeline_filter.as_deref().unwrap_or("all pipelines");
        report.push_str(&format!(
            "*Scope: {}. Dispersion policy: {}*\n\n",
            scope,
            results.config.model_policy.name()
        ));
        report.push_str("| Model | Articles | mean_ERR | median_std | flip_rate |\n");
        report.push_str("|-------|----------|----------|------------|-----------|\n");
        for row in &results.model_metrics {
            report.push_str(&format!(
                "| {} | {} | {} | {} | {} |\n",
                row.model_name,
                row.summary.articles,
                format_metric(row.summary.mean_err),
                format_metric(row.summary.median_std),
                format_metric(row.flip_rate)
            ));
        }

        report.push_str("\n## Prompt Hash Consistency\n\n");
        if results.prompt_hash_violations.is_empty() {
            report.push_str("All runs of each (model, article) used the same prompt.\n\n");
        } else {
            report.push_str("| Model | Article | Hashes |\n");
            report.push_str("|-------|---------|--------|\n");
            for violation in &results.prompt_hash_violations {
                report.push_str(&format!(
                    "| {} | {} | {} |\n",
                    violation.model_name,
                    violation.article_id,
                    violation.prompt_hashes.join("<br>")
                ));
            }
            report.push('\n');
        }

        report.push_str(&format!("Values shown as `{}` are not available.\n\n", NOT_AVAILABLE));
        report.push_str("## Configuration\n\n");
        report.push_str(&format!(
            "```json\n{}\n```\n",
            serde_json::to_string_pretty(&results.config).unwrap_or_default()
        ));

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::write_batch;
    use crate::synthetic::{generate, SyntheticConfig};

    #[test]
    fn test_pipeline_synthetic() {
        let records = generate(&SyntheticConfig::default());
        let mut pipeline = AuditPipeline::with_records(AuditConfig::default(), records);
        let results = pipeline.run().expect("Pipeline should succeed");

        assert_eq!(results.condition_metrics.len(), 1);
        assert_eq!(results.model_metrics.len(), 2);
        assert_eq!(results.record_info.total_records, 200);
        for model in &results.model_metrics {
            assert_eq!(model.summary.articles, 20);
            let err = model.summary.mean_err.unwrap();
            assert!(err > 0.0 && err <= 1.0);
        }
        assert!(results.prompt_hash_violations.is_empty());
    }

    #[test]
    fn test_pipeline_filter_limits_model_view() {
        let mut records = generate(&SyntheticConfig::default());
        records.extend(generate(&SyntheticConfig {
            pipeline: "P2".to_string(),
            models: vec!["devstral".to_string()],
            ..SyntheticConfig::default()
        }));

        let config = AuditConfig {
            pipeline_filter: Some("P1".to_string()),
            ..AuditConfig::default()
        };
        let results = AuditPipeline::with_records(config, records).run().unwrap();

        assert_eq!(results.condition_metrics.len(), 2);
        assert_eq!(results.model_metrics.len(), 2);
        assert!(results.model_metrics.iter().all(|m| m.model_name != "devstral"));
        assert_eq!(results.record_info.model_view_records, 200);
    }

    #[test]
    fn test_pipeline_loads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let records = generate(&SyntheticConfig::default());
        let (first, second) = records.split_at(90);
        write_batch(&dir.path().join("run_a.csv"), first).unwrap();
        write_batch(&dir.path().join("run_b.csv"), second).unwrap();

        let config = AuditConfig {
            run_patterns: vec![dir.path().join("*.csv").to_string_lossy().to_string()],
            ..AuditConfig::default()
        };
        let from_disk = AuditPipeline::new(config.clone()).run().unwrap();
        let in_memory = AuditPipeline::with_records(config, records).run().unwrap();

        assert_eq!(from_disk.record_info.source_files.len(), 2);
        assert_eq!(from_disk.model_metrics, in_memory.model_metrics);
        assert_eq!(from_disk.condition_metrics, in_memory.condition_metrics);
    }

    #[test]
    fn test_pipeline_without_data_fails() {
        let dir = tempfile::tempdir().unwrap();
        let config = AuditConfig {
            run_patterns: vec![dir.path().join("*.csv").to_string_lossy().to_string()],
            ..AuditConfig::default()
        };

        let err = AuditPipeline::new(config).run().unwrap_err();
        assert!(format!("{:#}", err).contains("no run batches matched"));
    }

    #[test]
    fn test_config_from_json_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.json");
        std::fs::write(&path, r#"{"pipeline_filter": "P1", "model_policy": "ZeroFill"}"#).unwrap();

        let config = AuditConfig::from_json_file(&path).unwrap();
        assert_eq!(config.pipeline_filter.as_deref(), Some("P1"));
        assert_eq!(config.model_policy, DispersionPolicy::ZeroFill);
        assert_eq!(config.condition_policy, DispersionPolicy::ZeroFill);
        assert_eq!(config.run_patterns, vec![DEFAULT_PATTERN.to_string()]);
    }

    #[test]
    fn test_generate_report() {
        let records = generate(&SyntheticConfig {
            prompt_drift_probability: 0.3,
            ..SyntheticConfig::default()
        });
        let config = AuditConfig {
            expected_models: vec!["devstral".to_string()],
            ..AuditConfig::default()
        };
        let results = AuditPipeline::with_records(config, records).run().unwrap();
        let report = AuditPipeline::generate_report(&results);

        assert!(report.contains("Reproducibility Audit Report"));
        assert!(report.contains("Stability by Model"));
        assert!(report.contains("| devstral | 0 | - | - | - |"));
        assert!(report.contains("| Model | Article | Hashes |"));
    }

    #[test]
    fn test_save_results() {
        let dir = tempfile::tempdir().unwrap();
        let records = generate(&SyntheticConfig::default());
        let results = AuditPipeline::with_records(AuditConfig::default(), records).run().unwrap();

        let path = dir.path().join("out").join("audit.json");
        AuditPipeline::save_results(&results, &path).unwrap();

        let saved: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert!(saved["model_metrics"][0]["mean_ERR"].is_number());
        assert!(saved["model_metrics"][0]["flip_rate"].is_number());
        assert_eq!(saved["model_metrics"][0]["dispersion_policy"], "SkipMissing");
    }
}
