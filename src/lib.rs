// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Reproducibility audit for repeated bias-labeling runs
//!
//! This crate provides:
//! - Run record loading from a CSV record store
//! - Stability metrics (exact repeat rate, score dispersion, flip rate)
//!   grouped by (condition, pipeline) and by model
//! - Prompt-hash consistency checking across repeated runs
//! - Plain-text, markdown and JSON reporting
//! - Seeded synthetic run batches for demos and tests

pub mod consistency;
pub mod error;
pub mod hashing;
pub mod loader;
pub mod metrics;
pub mod pipeline;
pub mod records;
pub mod report;
pub mod store;
pub mod synthetic;

pub use consistency::{ConsistencyChecker, ConsistencyViolation};
pub use error::AuditError;
pub use loader::RunRecordLoader;
pub use metrics::{
    ArticleStats, ConditionPipelineMetrics, DispersionPolicy, GroupSummary, MetricsAggregator, ModelMetrics,
};
pub use pipeline::{AuditConfig, AuditPipeline, AuditResults};
pub use records::RunRecord;
pub use store::RunRecordWriter;
