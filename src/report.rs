// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Plain-text rendering of audit results
//!
//! Metrics are printed with a fixed precision of [`METRIC_PRECISION`]
//! decimal places; values that are not available print as [`NOT_AVAILABLE`].

use crate::consistency::ConsistencyViolation;
use crate::metrics::{ConditionPipelineMetrics, GroupSummary, ModelMetrics, METRIC_PRECISION};

/// Placeholder for aggregates that could not be computed
pub const NOT_AVAILABLE: &str = "-";

/// Render an optional metric at the fixed report precision
pub fn format_metric(value: Option<f64>) -> String {
    value.map_or(NOT_AVAILABLE.to_string(), |v| {
        format!("{:.*}", METRIC_PRECISION as usize, v)
    })
}

/// Right-aligned text table
#[derive(Debug, Clone, Default)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: &[&str]) -> Self {
        Self {
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, row: Vec<String>) {
        debug_assert_eq!(row.len(), self.headers.len());
        self.rows.push(row);
    }

    pub fn render(&self) -> String {
        let mut widths: Vec<usize> = self.headers.iter().map(|h| h.chars().count()).collect();
        for row in &self.rows {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(cell.chars().count());
            }
        }

        let mut out = String::new();
        out.push_str(&render_line(&self.headers, &widths));
        for row in &self.rows {
            out.push('\n');
            out.push_str(&render_line(row, &widths));
        }
        out
    }
}

fn render_line(cells: &[String], widths: &[usize]) -> String {
    cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| format!("{:>width$}", cell, width = width))
        .collect::<Vec<_>>()
        .join("  ")
}

fn label_missing_note(rows: &[(&str, &GroupSummary)]) -> String {
    let mut note = String::new();
    for (key, summary) in rows {
        if summary.label_missing_articles > 0 {
            note.push_str(&format!(
                "\nnote: {}: {} article(s) with a missing label excluded from mean_ERR",
                key, summary.label_missing_articles
            ));
        }
    }
    note
}

/// Table for the (condition, pipeline) view, in the given row order
pub fn format_condition_table(results: &[ConditionPipelineMetrics]) -> String {
    let mut table = Table::new(&["condition", "pipeline", "mean_ERR", "median_std", "articles"]);
    for row in results {
        table.push_row(vec![
            row.condition.clone(),
            row.pipeline.clone(),
            format_metric(row.summary.mean_err),
            format_metric(row.summary.median_std),
            row.summary.articles.to_string(),
        ]);
    }

    let keys: Vec<String> = results.iter().map(|r| format!("{}/{}", r.condition, r.pipeline)).collect();
    let notes: Vec<(&str, &GroupSummary)> = keys
        .iter()
        .zip(results)
        .map(|(key, row)| (key.as_str(), &row.summary))
        .collect();

    table.render() + &label_missing_note(&notes)
}

/// Table for the per-model view, in the given row order
pub fn format_model_table(results: &[ModelMetrics]) -> String {
    let mut table = Table::new(&["model_name", "articles", "mean_ERR", "median_std", "flip_rate"]);
    for row in results {
        table.push_row(vec![
            row.model_name.clone(),
            row.summary.articles.to_string(),
            format_metric(row.summary.mean_err),
            format_metric(row.summary.median_std),
            format_metric(row.flip_rate),
        ]);
    }

    let notes: Vec<(&str, &GroupSummary)> = results
        .iter()
        .map(|row| (row.model_name.as_str(), &row.summary))
        .collect();

    table.render() + &label_missing_note(&notes)
}

/// Warning listing for prompt-hash violations, or a confirmation line
pub fn format_violations(violations: &[ConsistencyViolation]) -> String {
    if violations.is_empty() {
        return "prompt_hash is consistent across runs for each (model, article).".to_string();
    }

    let mut out = String::from("WARNING: inconsistent prompt_hash for some (model, article). Check these:");
    for violation in violations {
        out.push_str("\n  ");
        out.push_str(&violation.format());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::DispersionPolicy;

    fn summary(mean_err: Option<f64>, median_std: Option<f64>, articles: usize) -> GroupSummary {
        GroupSummary {
            articles,
            mean_err,
            median_std,
            flipped_articles: 0,
            label_missing_articles: 0,
            dispersion_policy: DispersionPolicy::SkipMissing,
        }
    }

    #[test]
    fn test_format_metric_precision() {
        assert_eq!(format_metric(Some(0.8)), "0.800000");
        assert_eq!(format_metric(Some(1.0 / 3.0)), "0.333333");
        assert_eq!(format_metric(Some(0.1234567)), "0.123457");
        assert_eq!(format_metric(None), NOT_AVAILABLE);
    }

    #[test]
    fn test_table_alignment() {
        let mut table = Table::new(&["name", "value"]);
        table.push_row(vec!["a".to_string(), "1".to_string()]);
        table.push_row(vec!["longer".to_string(), "22".to_string()]);

        let rendered = table.render();
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines, vec!["  name  value", "     a      1", "longer     22"]);
    }

    #[test]
    fn test_model_table_with_unavailable_row() {
        let results = vec![
            ModelMetrics {
                model_name: "mistral".to_string(),
                flip_rate: Some(0.5),
                summary: summary(Some(0.9), Some(0.05), 4),
            },
            ModelMetrics {
                model_name: "devstral".to_string(),
                flip_rate: None,
                summary: summary(None, None, 0),
            },
        ];

        let table = format_model_table(&results);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("flip_rate"));
        assert!(lines[1].contains("0.900000"));
        assert!(lines[1].contains("0.500000"));
        assert!(lines[2].trim_end().ends_with(NOT_AVAILABLE));
        assert!(lines[2].contains("devstral"));
    }

    #[test]
    fn test_condition_table_notes_missing_labels() {
        let mut flagged = summary(Some(1.0), Some(0.0), 3);
        flagged.label_missing_articles = 2;
        let results = vec![ConditionPipelineMetrics {
            condition: "sampled".to_string(),
            pipeline: "P1".to_string(),
            summary: flagged,
        }];

        let table = format_condition_table(&results);
        assert!(table.contains("sampled"));
        assert!(table.contains("note: sampled/P1: 2 article(s) with a missing label"));
    }

    #[test]
    fn test_format_violations() {
        assert!(format_violations(&[]).contains("consistent"));

        let listing = format_violations(&[ConsistencyViolation {
            model_name: "mistral".to_string(),
            article_id: "a1".to_string(),
            prompt_hashes: vec!["abc123".to_string(), "def456".to_string()],
        }]);
        assert!(listing.starts_with("WARNING"));
        assert!(listing.contains("model=mistral article_id=a1 hashes=[abc123, def456]"));
    }
}
