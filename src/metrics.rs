// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Stability metrics across repeated runs
//!
//! Implements:
//! - Exact Repeat Rate (agreement with the article's modal label)
//! - Score dispersion (population standard deviation of numeric scores)
//! - Flip detection (two or more distinct labels for one article)
//! - Group aggregates for the (condition, pipeline) and per-model views
//!
//! All grouping goes through ordered maps so results never depend on the
//! order records were loaded in.

use crate::records::RunRecord;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

/// Decimal places used when metrics are rounded for display and ranking
pub const METRIC_PRECISION: i32 = 6;

/// What an article with fewer than two numeric scores contributes to `median_std`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DispersionPolicy {
    /// Dispersion is reported as 0.0 and counts toward the median
    ZeroFill,
    /// Dispersion is undefined and left out of the median
    SkipMissing,
}

impl DispersionPolicy {
    pub fn name(&self) -> &'static str {
        match self {
            DispersionPolicy::ZeroFill => "zero-fill",
            DispersionPolicy::SkipMissing => "skip-missing",
        }
    }

    fn insufficient(&self) -> Option<f64> {
        match self {
            DispersionPolicy::ZeroFill => Some(0.0),
            DispersionPolicy::SkipMissing => None,
        }
    }
}

/// Most frequent label. Ties go to the lexicographically smallest label.
pub fn modal_label<'a>(labels: &[&'a str]) -> Option<&'a str> {
    let mut counts: BTreeMap<&'a str, usize> = BTreeMap::new();
    for &label in labels {
        *counts.entry(label).or_insert(0) += 1;
    }

    // BTreeMap iterates in ascending order, so a strict `>` keeps the
    // smallest label among equal counts.
    let mut best: Option<(&'a str, usize)> = None;
    for (label, count) in counts {
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((label, count));
        }
    }
    best.map(|(label, _)| label)
}

/// Fraction of labels equal to the modal label
pub fn exact_repeat_rate(labels: &[&str]) -> Option<f64> {
    let modal = modal_label(labels)?;
    let agreeing = labels.iter().filter(|l| **l == modal).count();
    Some(agreeing as f64 / labels.len() as f64)
}

/// Population standard deviation (divide by N)
///
/// Uses Welford's update, which gives exactly 0.0 for identical values.
pub fn population_std(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }

    let mut mean = 0.0;
    let mut m2 = 0.0;
    for (i, &x) in values.iter().enumerate() {
        let delta = x - mean;
        mean += delta / (i + 1) as f64;
        m2 += delta * (x - mean);
    }

    Some((m2 / values.len() as f64).sqrt())
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Median; the mean of the two middle values for even lengths
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Round to [`METRIC_PRECISION`] decimal places
pub fn round_metric(value: f64) -> f64 {
    let scale = 10f64.powi(METRIC_PRECISION);
    (value * scale).round() / scale
}

/// Stability statistics for one article's repeated runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleStats {
    pub article_id: String,
    pub runs: usize,
    /// Modal label; `None` when any run is missing its label
    pub modal_label: Option<String>,
    /// `None` when any run is missing its label
    pub exact_repeat_rate: Option<f64>,
    pub label_missing: bool,
    /// Distinct labels among runs that carry one
    pub distinct_labels: usize,
    /// Runs whose score parsed as a number
    pub numeric_scores: usize,
    /// `None` means undefined under the skip-missing policy
    pub dispersion: Option<f64>,
}

impl ArticleStats {
    pub fn flipped(&self) -> bool {
        self.distinct_labels >= 2
    }
}

/// Aggregates over the articles of one group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupSummary {
    /// Distinct article ids contributing to the group
    pub articles: usize,
    #[serde(rename = "mean_ERR")]
    pub mean_err: Option<f64>,
    pub median_std: Option<f64>,
    pub flipped_articles: usize,
    /// Articles whose ERR could not be computed because a label was missing
    pub label_missing_articles: usize,
    pub dispersion_policy: DispersionPolicy,
}

impl GroupSummary {
    /// Summary for a group with no articles: every aggregate is not available
    pub fn empty(policy: DispersionPolicy) -> Self {
        Self {
            articles: 0,
            mean_err: None,
            median_std: None,
            flipped_articles: 0,
            label_missing_articles: 0,
            dispersion_policy: policy,
        }
    }

    pub fn flip_rate(&self) -> Option<f64> {
        if self.articles == 0 {
            return None;
        }
        Some(self.flipped_articles as f64 / self.articles as f64)
    }
}

/// One row of the (condition, pipeline) view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionPipelineMetrics {
    pub condition: String,
    pub pipeline: String,
    #[serde(flatten)]
    pub summary: GroupSummary,
}

/// One row of the per-model view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetrics {
    pub model_name: String,
    pub flip_rate: Option<f64>,
    #[serde(flatten)]
    pub summary: GroupSummary,
}

impl ModelMetrics {
    /// Ranking order: ascending (flip_rate, median_std, model_name) on
    /// rounded values, not-available last
    pub fn ranking(a: &Self, b: &Self) -> Ordering {
        cmp_rounded(a.flip_rate, b.flip_rate)
            .then_with(|| cmp_rounded(a.summary.median_std, b.summary.median_std))
            .then_with(|| a.model_name.cmp(&b.model_name))
    }
}

fn cmp_rounded(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => round_metric(a).total_cmp(&round_metric(b)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Computes per-article and per-group stability metrics
#[derive(Debug, Clone, Copy)]
pub struct MetricsAggregator {
    dispersion_missing_policy: DispersionPolicy,
}

impl MetricsAggregator {
    pub fn new(dispersion_missing_policy: DispersionPolicy) -> Self {
        Self { dispersion_missing_policy }
    }

    /// Aggregator configured the way the (condition, pipeline) view reports
    pub fn for_condition_pipeline() -> Self {
        Self::new(DispersionPolicy::ZeroFill)
    }

    /// Aggregator configured the way the per-model view reports
    pub fn for_models() -> Self {
        Self::new(DispersionPolicy::SkipMissing)
    }

    pub fn policy(&self) -> DispersionPolicy {
        self.dispersion_missing_policy
    }

    /// Statistics for the runs of a single article
    pub fn article_stats(&self, article_id: &str, runs: &[&RunRecord]) -> ArticleStats {
        let labels: Vec<Option<&str>> = runs.iter().map(|r| r.label()).collect();
        let label_missing = labels.iter().any(Option::is_none);
        let present: Vec<&str> = labels.iter().flatten().copied().collect();
        let distinct_labels = present.iter().collect::<BTreeSet<_>>().len();

        let (modal, err) = if label_missing {
            (None, None)
        } else {
            (modal_label(&present), exact_repeat_rate(&present))
        };

        let mut scores: Vec<f64> = runs.iter().filter_map(|r| r.score()).collect();
        scores.sort_by(f64::total_cmp);
        let dispersion = if scores.len() >= 2 {
            population_std(&scores)
        } else {
            self.dispersion_missing_policy.insufficient()
        };

        ArticleStats {
            article_id: article_id.to_string(),
            runs: runs.len(),
            modal_label: modal.map(str::to_string),
            exact_repeat_rate: err,
            label_missing,
            distinct_labels,
            numeric_scores: scores.len(),
            dispersion,
        }
    }

    /// Per-article statistics for a group, in article id order
    pub fn articles<'a, I>(&self, records: I) -> Vec<ArticleStats>
    where
        I: IntoIterator<Item = &'a RunRecord>,
    {
        let mut by_article: BTreeMap<&str, Vec<&RunRecord>> = BTreeMap::new();
        for record in records {
            by_article.entry(record.article_id.as_str()).or_default().push(record);
        }

        by_article
            .into_iter()
            .map(|(article_id, runs)| self.article_stats(article_id, &runs))
            .collect()
    }

    /// Collapse per-article statistics into group aggregates
    pub fn summarize(&self, articles: &[ArticleStats]) -> GroupSummary {
        if articles.is_empty() {
            return GroupSummary::empty(self.dispersion_missing_policy);
        }

        let errs: Vec<f64> = articles.iter().filter_map(|a| a.exact_repeat_rate).collect();
        let stds: Vec<f64> = articles.iter().filter_map(|a| a.dispersion).collect();
        let label_missing_articles = articles.iter().filter(|a| a.label_missing).count();

        if label_missing_articles > 0 {
            tracing::warn!(
                "{} of {} articles have runs with a missing label; ERR not computed for them",
                label_missing_articles,
                articles.len()
            );
        }

        GroupSummary {
            articles: articles.len(),
            mean_err: mean(&errs),
            median_std: median(&stds),
            flipped_articles: articles.iter().filter(|a| a.flipped()).count(),
            label_missing_articles,
            dispersion_policy: self.dispersion_missing_policy,
        }
    }

    /// Metrics for each (condition, pipeline) group, in key order
    pub fn by_condition_pipeline(&self, records: &[RunRecord]) -> Vec<ConditionPipelineMetrics> {
        let mut groups: BTreeMap<(&str, &str), Vec<&RunRecord>> = BTreeMap::new();
        for record in records {
            groups
                .entry((record.condition.as_str(), record.pipeline.as_str()))
                .or_default()
                .push(record);
        }

        groups
            .into_iter()
            .map(|((condition, pipeline), group)| {
                let articles = self.articles(group);
                ConditionPipelineMetrics {
                    condition: condition.to_string(),
                    pipeline: pipeline.to_string(),
                    summary: self.summarize(&articles),
                }
            })
            .collect()
    }

    /// Metrics for each model found in `records`, ranked
    pub fn by_model(&self, records: &[RunRecord]) -> Vec<ModelMetrics> {
        self.by_model_with_expected(records, &[])
    }

    /// Like [`Self::by_model`], but every model in `expected` gets a row even
    /// when it has no records
    pub fn by_model_with_expected(&self, records: &[RunRecord], expected: &[String]) -> Vec<ModelMetrics> {
        let mut groups: BTreeMap<&str, Vec<&RunRecord>> = BTreeMap::new();
        for model in expected {
            groups.entry(model.as_str()).or_default();
        }
        for record in records {
            groups.entry(record.model_name.as_str()).or_default().push(record);
        }

        let mut results: Vec<ModelMetrics> = groups
            .into_iter()
            .map(|(model_name, group)| {
                if group.is_empty() {
                    tracing::warn!("Model '{}' has no runs; aggregates not available", model_name);
                }
                let articles = self.articles(group);
                let summary = self.summarize(&articles);
                ModelMetrics {
                    model_name: model_name.to_string(),
                    flip_rate: summary.flip_rate(),
                    summary,
                }
            })
            .collect();

        results.sort_by(ModelMetrics::ranking);
        results
    }
}
