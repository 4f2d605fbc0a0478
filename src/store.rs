// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! CSV record store writer
//!
//! A batch file starts with the [`RECORD_COLUMNS`] header and grows by one
//! row per model invocation. Opening an existing batch appends to it.

use crate::error::{AuditError, Result};
use crate::records::{RunRecord, RECORD_COLUMNS};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// Appends run records to one batch file
pub struct RunRecordWriter {
    path: PathBuf,
    writer: csv::Writer<File>,
}

impl RunRecordWriter {
    /// Open `path` for appending, writing the header if the file is new or empty
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let needs_header = std::fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);

        if needs_header {
            writer
                .write_record(RECORD_COLUMNS)
                .map_err(|source| csv_error(path, source))?;
        }

        Ok(Self {
            path: path.to_path_buf(),
            writer,
        })
    }

    pub fn append(&mut self, record: &RunRecord) -> Result<()> {
        self.writer
            .serialize(record)
            .map_err(|source| csv_error(&self.path, source))
    }

    pub fn append_all<'a>(&mut self, records: impl IntoIterator<Item = &'a RunRecord>) -> Result<usize> {
        let mut written = 0;
        for record in records {
            self.append(record)?;
            written += 1;
        }
        Ok(written)
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Write `records` to a fresh batch file, replacing any existing one
pub fn write_batch(path: &Path, records: &[RunRecord]) -> Result<usize> {
    if path.exists() {
        std::fs::remove_file(path)?;
    }
    let mut writer = RunRecordWriter::open(path)?;
    let written = writer.append_all(records)?;
    writer.flush()?;
    tracing::debug!("Wrote {} records to {}", written, path.display());
    Ok(written)
}

fn csv_error(path: &Path, source: csv::Error) -> AuditError {
    AuditError::Csv {
        path: path.display().to_string(),
        source,
    }
}
