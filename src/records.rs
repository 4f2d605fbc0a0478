// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Run records produced by repeated bias-labeling invocations
//!
//! One [`RunRecord`] is one model invocation for one article. Every column is
//! kept as the raw text found in the record store; numeric and JSON columns
//! are coerced on demand so that a malformed value only affects the metric
//! that needs it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Column order of the record store. Fixed for file compatibility.
pub const RECORD_COLUMNS: [&str; 17] = [
    "run_id",
    "timestamp",
    "condition",
    "pipeline",
    "article_id",
    "bias_label",
    "bias_score",
    "evidence_sent_ids_json",
    "rationale_hash",
    "prompt_hash",
    "model_name",
    "model_version",
    "decoding_params_json",
    "agentic_steps_json_hash",
    "tool_snapshot_id",
    "code_git_sha",
    "env_fingerprint",
];

/// A single observation of one run for one article
///
/// Field order matches [`RECORD_COLUMNS`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunRecord {
    pub run_id: String,
    pub timestamp: String,
    /// Experimental condition (e.g. "deterministic", "sampled")
    pub condition: String,
    /// Pipeline variant (e.g. "P1")
    pub pipeline: String,
    pub article_id: String,
    /// Label from an open set, compared by exact string identity
    pub bias_label: String,
    /// Raw score text; see [`RunRecord::score`]
    pub bias_score: String,
    pub evidence_sent_ids_json: String,
    pub rationale_hash: String,
    pub prompt_hash: String,
    pub model_name: String,
    pub model_version: String,
    pub decoding_params_json: String,
    pub agentic_steps_json_hash: String,
    pub tool_snapshot_id: String,
    pub code_git_sha: String,
    /// Opaque environment snapshot supplied by the producer
    pub env_fingerprint: String,
    /// Batch file this record was loaded from (not a store column)
    #[serde(skip)]
    pub source_file: Option<PathBuf>,
}

impl RunRecord {
    /// Minimal record for one run of `model_name` on `article_id`
    pub fn new(model_name: &str, article_id: &str, bias_label: &str) -> Self {
        Self {
            model_name: model_name.to_string(),
            article_id: article_id.to_string(),
            bias_label: bias_label.to_string(),
            ..Self::default()
        }
    }

    pub fn with_run_id(mut self, run_id: &str) -> Self {
        self.run_id = run_id.to_string();
        self
    }

    pub fn with_condition(mut self, condition: &str, pipeline: &str) -> Self {
        self.condition = condition.to_string();
        self.pipeline = pipeline.to_string();
        self
    }

    pub fn with_score(mut self, score: &str) -> Self {
        self.bias_score = score.to_string();
        self
    }

    pub fn with_prompt_hash(mut self, hash: &str) -> Self {
        self.prompt_hash = hash.to_string();
        self
    }

    /// The label, or `None` when the store held an empty value
    pub fn label(&self) -> Option<&str> {
        if self.bias_label.is_empty() {
            None
        } else {
            Some(&self.bias_label)
        }
    }

    /// Numeric score, or `None` when the raw value does not parse
    pub fn score(&self) -> Option<f64> {
        parse_score(&self.bias_score)
    }

    /// Evidence sentence ids decoded from the JSON pass-through column
    pub fn evidence_sent_ids(&self) -> serde_json::Result<Vec<i64>> {
        if self.evidence_sent_ids_json.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&self.evidence_sent_ids_json)
    }

    /// Decoding parameters decoded from the JSON pass-through column
    pub fn decoding_params(&self) -> serde_json::Result<BTreeMap<String, serde_json::Value>> {
        let raw = self.decoding_params_json.trim();
        if raw.is_empty() || raw == "null" {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(raw)
    }
}

/// Coerce a raw score to a finite number. Anything else counts as absent.
pub fn parse_score(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_score() {
        assert_eq!(parse_score("0.3"), Some(0.3));
        assert_eq!(parse_score(" -1 "), Some(-1.0));
        assert_eq!(parse_score("0"), Some(0.0));
        assert_eq!(parse_score("x"), None);
        assert_eq!(parse_score(""), None);
        assert_eq!(parse_score("NaN"), None);
        assert_eq!(parse_score("inf"), None);
    }

    #[test]
    fn test_label_missing() {
        let record = RunRecord::new("mistral", "a1", "");
        assert_eq!(record.label(), None);

        let record = RunRecord::new("mistral", "a1", "left");
        assert_eq!(record.label(), Some("left"));
    }

    #[test]
    fn test_label_is_not_trimmed() {
        let record = RunRecord::new("mistral", "a1", " Left");
        assert_eq!(record.label(), Some(" Left"));
    }

    #[test]
    fn test_json_pass_through_columns() {
        let mut record = RunRecord::new("mistral", "a1", "Left");
        record.evidence_sent_ids_json = "[1, 4, 7]".to_string();
        record.decoding_params_json = r#"{"max_tokens": 512, "temperature": 0.0}"#.to_string();

        assert_eq!(record.evidence_sent_ids().unwrap(), vec![1, 4, 7]);
        let params = record.decoding_params().unwrap();
        assert_eq!(params.len(), 2);
        assert_eq!(params["max_tokens"], serde_json::json!(512));

        record.evidence_sent_ids_json.clear();
        record.decoding_params_json = "null".to_string();
        assert!(record.evidence_sent_ids().unwrap().is_empty());
        assert!(record.decoding_params().unwrap().is_empty());

        record.evidence_sent_ids_json = "not json".to_string();
        assert!(record.evidence_sent_ids().is_err());
    }

    #[test]
    fn test_builder_sets_grouping_fields() {
        let record = RunRecord::new("llama2", "a9", "Neutral")
            .with_run_id("r3")
            .with_condition("sampled", "P1")
            .with_score("0.25")
            .with_prompt_hash("abc123");

        assert_eq!(record.run_id, "r3");
        assert_eq!(record.condition, "sampled");
        assert_eq!(record.pipeline, "P1");
        assert_eq!(record.score(), Some(0.25));
        assert_eq!(record.prompt_hash, "abc123");
    }
}
