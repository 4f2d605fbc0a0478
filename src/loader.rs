// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Loading run batches from the record store
//!
//! Every file matched by any source pattern is one batch. Batches are read
//! in sorted path order and concatenated; no field validation happens here.

use crate::error::{AuditError, Result};
use crate::records::RunRecord;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Default location of run batches
pub const DEFAULT_PATTERN: &str = "runs/*.csv";

/// Reads and merges every batch matching a set of glob patterns
#[derive(Debug, Clone)]
pub struct RunRecordLoader {
    patterns: Vec<String>,
}

impl Default for RunRecordLoader {
    fn default() -> Self {
        Self::new([DEFAULT_PATTERN])
    }
}

impl RunRecordLoader {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            patterns: patterns.into_iter().map(Into::into).collect(),
        }
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// Expand the patterns into a sorted, de-duplicated list of batch files
    ///
    /// Fails with [`AuditError::NoDataFound`] when nothing matches.
    pub fn resolve(&self) -> Result<Vec<PathBuf>> {
        let mut paths = BTreeSet::new();

        for pattern in &self.patterns {
            let entries = glob::glob(pattern).map_err(|e| AuditError::InvalidPattern {
                pattern: pattern.clone(),
                reason: e.to_string(),
            })?;
            for entry in entries {
                let path = entry.map_err(|e| e.into_error())?;
                if path.is_file() {
                    paths.insert(path);
                }
            }
        }

        if paths.is_empty() {
            return Err(AuditError::NoDataFound {
                patterns: self.patterns.clone(),
            });
        }

        Ok(paths.into_iter().collect())
    }

    /// Load every matching batch into one collection
    pub fn load(&self) -> Result<Vec<RunRecord>> {
        let paths = self.resolve()?;
        let mut records = Vec::new();

        for path in &paths {
            let batch = read_batch(path)?;
            tracing::info!("Loaded {} records from {}", batch.len(), path.display());
            records.extend(batch);
        }

        tracing::info!("Loaded {} records from {} batches", records.len(), paths.len());
        Ok(records)
    }
}

/// Read one batch file, tagging each record with its source path
pub fn read_batch(path: &Path) -> Result<Vec<RunRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(|source| AuditError::Csv {
            path: path.display().to_string(),
            source,
        })?;

    let mut records = Vec::new();
    for result in reader.deserialize::<RunRecord>() {
        let mut record = result.map_err(|source| AuditError::Csv {
            path: path.display().to_string(),
            source,
        })?;
        record.source_file = Some(path.to_path_buf());
        records.push(record);
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::write_batch;

    fn pattern_in(dir: &Path, glob: &str) -> String {
        dir.join(glob).to_string_lossy().to_string()
    }

    #[test]
    fn test_no_batches_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let loader = RunRecordLoader::new([pattern_in(dir.path(), "*.csv")]);

        match loader.load() {
            Err(AuditError::NoDataFound { patterns }) => assert_eq!(patterns.len(), 1),
            other => panic!("expected NoDataFound, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_pattern() {
        let loader = RunRecordLoader::new(["runs/[.csv"]);
        assert!(matches!(loader.resolve(), Err(AuditError::InvalidPattern { .. })));
    }

    #[test]
    fn test_merges_batches_and_preserves_fields() {
        let dir = tempfile::tempdir().unwrap();

        let mut first = RunRecord::new("mistral", "a1", "Left")
            .with_run_id("r1")
            .with_condition("deterministic", "P1")
            .with_score("0.4")
            .with_prompt_hash("abc123");
        first.evidence_sent_ids_json = "[0, 2]".to_string();
        first.env_fingerprint = r#"{"os": "Linux"}"#.to_string();
        let second = RunRecord::new("llama2", "a2", "Right").with_score("x");

        write_batch(&dir.path().join("run_1.csv"), &[first.clone()]).unwrap();
        write_batch(&dir.path().join("run_2.csv"), &[second.clone(), second.clone()]).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let loader = RunRecordLoader::new([pattern_in(dir.path(), "*.csv")]);
        let records = loader.load().unwrap();

        assert_eq!(records.len(), 3);
        let mut loaded_first = records[0].clone();
        assert_eq!(
            loaded_first.source_file.as_deref(),
            Some(dir.path().join("run_1.csv").as_path())
        );
        loaded_first.source_file = None;
        assert_eq!(loaded_first, first);
        assert_eq!(records[1].bias_score, "x");
        assert_eq!(records[1].score(), None);
    }

    #[test]
    fn test_overlapping_patterns_read_each_file_once() {
        let dir = tempfile::tempdir().unwrap();
        write_batch(&dir.path().join("run_1.csv"), &[RunRecord::new("m", "a1", "Left")]).unwrap();

        let loader = RunRecordLoader::new([
            pattern_in(dir.path(), "*.csv"),
            pattern_in(dir.path(), "run_*.csv"),
        ]);

        assert_eq!(loader.resolve().unwrap().len(), 1);
        assert_eq!(loader.load().unwrap().len(), 1);
    }

    #[test]
    fn test_header_only_batch_counts_as_data_source() {
        let dir = tempfile::tempdir().unwrap();
        write_batch(&dir.path().join("empty.csv"), &[]).unwrap();

        let loader = RunRecordLoader::new([pattern_in(dir.path(), "*.csv")]);
        assert!(loader.load().unwrap().is_empty());
    }

    #[test]
    fn test_missing_columns_default_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.csv");
        std::fs::write(&path, "model_name,article_id,bias_label,bias_score\nmistral,a1,Left,0.5\n").unwrap();

        let records = read_batch(&path).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].model_name, "mistral");
        assert_eq!(records[0].score(), Some(0.5));
        assert!(records[0].prompt_hash.is_empty());
    }
}
