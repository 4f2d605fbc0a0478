// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Input-fidelity check across repeated runs
//!
//! Repeated runs of one model on one article must have been sent the same
//! prompt. A differing `prompt_hash` points at the harness, not the model.

use crate::records::RunRecord;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A (model, article) pair whose runs saw more than one prompt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsistencyViolation {
    pub model_name: String,
    pub article_id: String,
    /// Every distinct hash observed, sorted
    pub prompt_hashes: Vec<String>,
}

impl ConsistencyViolation {
    pub fn format(&self) -> String {
        format!(
            "model={} article_id={} hashes=[{}]",
            self.model_name,
            self.article_id,
            self.prompt_hashes.join(", ")
        )
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ConsistencyChecker;

impl ConsistencyChecker {
    pub fn new() -> Self {
        Self
    }

    /// Collect every prompt-hash violation. Never fails.
    pub fn check(&self, records: &[RunRecord]) -> Vec<ConsistencyViolation> {
        let mut hashes: BTreeMap<(&str, &str), BTreeSet<&str>> = BTreeMap::new();
        for record in records {
            hashes
                .entry((record.model_name.as_str(), record.article_id.as_str()))
                .or_default()
                .insert(record.prompt_hash.as_str());
        }

        let violations: Vec<ConsistencyViolation> = hashes
            .into_iter()
            .filter(|(_, observed)| observed.len() > 1)
            .map(|((model_name, article_id), observed)| ConsistencyViolation {
                model_name: model_name.to_string(),
                article_id: article_id.to_string(),
                prompt_hashes: observed.into_iter().map(str::to_string).collect(),
            })
            .collect();

        if violations.is_empty() {
            tracing::debug!("prompt_hash consistent for all (model, article) pairs");
        } else {
            tracing::warn!("{} (model, article) pairs have inconsistent prompt_hash", violations.len());
        }

        violations
    }
}
