// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Error types for loading and writing run records

use std::io;

use thiserror::Error;

/// Failures raised by the record store and loader.
///
/// Data-quality anomalies (unparsable scores, missing labels, prompt-hash
/// mismatches) are not errors; they surface in the computed results instead.
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("no run batches matched {patterns:?}")]
    NoDataFound { patterns: Vec<String> },
    #[error("invalid source pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
    #[error("failed to read run batch {path}: {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AuditError>;
