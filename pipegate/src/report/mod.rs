//! The append-only run report.
//!
//! The report is available at any point in the run, not only at the end,
//! so partial progress survives an abort. Single-writer discipline: only
//! the runner appends; stages never touch the report.

mod export;

pub use export::ReportExporter;

use crate::core::{RunStatus, StageResult, StageStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The finalized record of one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    /// The pipeline name.
    pub pipeline: String,
    /// The run this report belongs to.
    pub run_id: Uuid,
    /// Per-stage results, in dispatch order.
    pub entries: Vec<StageResult>,
    /// The overall run status.
    pub status: RunStatus,
    /// The first hard-failing stage, if the run aborted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_failure: Option<String>,
    /// True when at least one stage finished with a warning.
    pub has_warnings: bool,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the report was finalized.
    pub finished_at: DateTime<Utc>,
}

impl Report {
    /// Looks up the entry for a stage.
    #[must_use]
    pub fn entry(&self, stage: &str) -> Option<&StageResult> {
        self.entries.iter().find(|e| e.stage == stage)
    }

    /// Counts entries with the given status.
    #[must_use]
    pub fn count_with_status(&self, status: StageStatus) -> usize {
        self.entries.iter().filter(|e| e.status == status).count()
    }

    /// Returns true if the run completed (possibly with warnings).
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Completed
    }
}

/// Accumulates per-stage results into an always-available report.
///
/// Append-only: entries are never retracted or rewritten, and the entry
/// count is monotonically non-decreasing. Finalization consumes the
/// aggregator, so a report can only be closed once.
#[derive(Debug)]
pub struct ReportAggregator {
    pipeline: String,
    run_id: Uuid,
    entries: Vec<StageResult>,
    first_failure: Option<String>,
    started_at: DateTime<Utc>,
}

impl ReportAggregator {
    /// Creates an aggregator for one run.
    #[must_use]
    pub fn new(pipeline: impl Into<String>, run_id: Uuid) -> Self {
        Self {
            pipeline: pipeline.into(),
            run_id,
            entries: Vec::new(),
            first_failure: None,
            started_at: Utc::now(),
        }
    }

    /// Appends one stage result. The first `Failed` entry is remembered as
    /// the run's hard-failure reference.
    pub fn append(&mut self, result: StageResult) {
        if result.status == StageStatus::Failed && self.first_failure.is_none() {
            self.first_failure = Some(result.stage.clone());
        }
        self.entries.push(result);
    }

    /// The entries recorded so far, in dispatch order.
    #[must_use]
    pub fn entries(&self) -> &[StageResult] {
        &self.entries
    }

    /// The number of entries recorded so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no entries were recorded yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The first hard-failing stage recorded so far.
    #[must_use]
    pub fn first_failure(&self) -> Option<&str> {
        self.first_failure.as_deref()
    }

    /// Closes the report. Consuming the aggregator makes a second
    /// finalization unrepresentable.
    #[must_use]
    pub fn finalize(self, status: RunStatus) -> Report {
        let has_warnings = self
            .entries
            .iter()
            .any(|e| e.status == StageStatus::Warning);
        Report {
            pipeline: self.pipeline,
            run_id: self.run_id,
            entries: self.entries,
            status,
            first_failure: self.first_failure,
            has_warnings,
            started_at: self.started_at,
            finished_at: Utc::now(),
        }
    }
}
