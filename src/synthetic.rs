// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Seeded synthetic run batches for demos and pipeline testing

use crate::hashing::{prompt_hash, sha256_hex};
use crate::records::RunRecord;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

const LABELS: [&str; 3] = ["Left", "Neutral", "Right"];

const SYSTEM_PROMPT: &str = "You are an impartial media-bias analyst. \
Label the article Left, Right or Neutral and return JSON.";

/// Shape and noise levels of a generated batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyntheticConfig {
    pub seed: u64,
    pub models: Vec<String>,
    pub articles: usize,
    pub runs_per_article: usize,
    pub condition: String,
    pub pipeline: String,
    /// Chance that a run disagrees with the article's base label
    pub flip_probability: f64,
    /// Chance that a run's score is written as unparsable text
    pub bad_score_probability: f64,
    /// Chance that a run was sent a perturbed prompt
    pub prompt_drift_probability: f64,
    /// Environment snapshot stamped on every record
    pub env_fingerprint: String,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            models: vec!["mistral:latest".to_string(), "llama2".to_string()],
            articles: 20,
            runs_per_article: 5,
            condition: "deterministic".to_string(),
            pipeline: "P1".to_string(),
            flip_probability: 0.1,
            bad_score_probability: 0.05,
            prompt_drift_probability: 0.0,
            env_fingerprint: r#"{"os": "synthetic"}"#.to_string(),
        }
    }
}

/// Generate one record per (model, article, run)
///
/// Output is a pure function of the config.
pub fn generate(config: &SyntheticConfig) -> Vec<RunRecord> {
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let decoding = serde_json::json!({"max_tokens": 512, "temperature": 0.0, "top_p": 1.0}).to_string();
    let mut records = Vec::with_capacity(config.models.len() * config.articles * config.runs_per_article);

    for model in &config.models {
        for article in 0..config.articles {
            let article_id = format!("art_{:03}", article);
            let base_label = LABELS[rng.gen_range(0..LABELS.len())];
            let base_score: f64 = rng.gen_range(-1.0..1.0);
            let user_prompt = serde_json::json!({"article_id": article_id}).to_string();
            let prompt = format!("{}\n{}", SYSTEM_PROMPT, user_prompt);

            for run in 0..config.runs_per_article {
                let label = if rng.gen_bool(config.flip_probability) {
                    LABELS[rng.gen_range(0..LABELS.len())]
                } else {
                    base_label
                };

                let score = if rng.gen_bool(config.bad_score_probability) {
                    "n/a".to_string()
                } else {
                    let jitter: f64 = rng.gen_range(-0.05..0.05);
                    format!("{:.3}", base_score + jitter)
                };

                let sent_prompt = if rng.gen_bool(config.prompt_drift_probability) {
                    format!("{} ", prompt)
                } else {
                    prompt.clone()
                };

                let rationale = format!("{} reads as {}", article_id, label);
                let mut record = RunRecord::new(model, &article_id, label)
                    .with_run_id(&format!("run_{}", run + 1))
                    .with_condition(&config.condition, &config.pipeline)
                    .with_score(&score)
                    .with_prompt_hash(&prompt_hash(&sent_prompt));
                record.timestamp = format!("2024-01-01T00:{:02}:00Z", run % 60);
                record.evidence_sent_ids_json = format!("[{}]", rng.gen_range(0..10));
                record.rationale_hash = sha256_hex(rationale.as_bytes());
                record.model_version = "local".to_string();
                record.decoding_params_json = decoding.clone();
                record.env_fingerprint = config.env_fingerprint.clone();
                records.push(record);
            }
        }
    }

    records
}
