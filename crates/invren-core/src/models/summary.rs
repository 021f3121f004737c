//! Per-file outcomes and the run summary.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::extract::Field;

/// What happened to one source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileStatus {
    /// Copy renamed to the derived name. `replaced` marks that an earlier
    /// file of the same run had derived that name and its copy was overwritten.
    Renamed {
        name: String,
        #[serde(default)]
        replaced: bool,
    },
    /// Copy kept under its original name because fields were missing.
    Unmatched { missing: Vec<Field> },
    /// A file-system or extraction error stopped this file.
    Failed { error: String },
}

/// Result of the overlay step for one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OverlayStatus {
    /// No overlay configured, or the file failed before the overlay step.
    Skipped,
    /// Stamp and appendix applied.
    Applied,
    /// Stamping failed; the copy was processed without it.
    Failed { error: String },
}

/// Record for one source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileOutcome {
    /// Original file.
    pub source: PathBuf,
    /// Where the copy ended up, if it was made.
    pub output: Option<PathBuf>,
    pub status: FileStatus,
    pub overlay: OverlayStatus,
}

impl FileOutcome {
    /// Whether the file counts as successful.
    pub fn is_success(&self) -> bool {
        matches!(self.status, FileStatus::Renamed { .. })
    }

    /// Source file name for display.
    pub fn file_name(&self) -> String {
        self.source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Counts and outcomes of one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    /// Directory the copies were written to.
    pub output_dir: PathBuf,
    pub successful: usize,
    pub failed: usize,
    pub outcomes: Vec<FileOutcome>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunSummary {
    pub(crate) fn new(output_dir: PathBuf, started_at: DateTime<Utc>) -> Self {
        Self {
            output_dir,
            successful: 0,
            failed: 0,
            outcomes: Vec::new(),
            started_at,
            finished_at: started_at,
        }
    }

    pub(crate) fn record(&mut self, outcome: FileOutcome) {
        if outcome.is_success() {
            self.successful += 1;
        } else {
            self.failed += 1;
        }
        self.outcomes.push(outcome);
    }

    /// Number of files processed.
    pub fn total(&self) -> usize {
        self.successful + self.failed
    }

    /// True when the source directory held no PDF files.
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Wall-clock duration of the run.
    pub fn elapsed(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }

    /// Renames that overwrote the copy of an earlier file in this run.
    pub fn replaced(&self) -> impl Iterator<Item = &FileOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, FileStatus::Renamed { replaced: true, .. }))
    }

    /// Outcomes that did not end in a rename.
    pub fn failures(&self) -> impl Iterator<Item = &FileOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }
}
