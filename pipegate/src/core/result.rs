//! Per-stage result records.

use super::StageStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// The finalized record of one stage's execution.
///
/// A `StageResult` is created when a stage begins (via [`StageRecorder`])
/// and finalized when it ends. It is never mutated afterwards; the report
/// holds these records verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageResult {
    /// The stage name.
    pub stage: String,

    /// The final status assigned by the gate enforcer.
    pub status: StageStatus,

    /// Raw tool output, preserved verbatim.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub output: String,

    /// Error text, if the stage reported or suffered one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Wall-clock duration of the stage in milliseconds.
    pub duration_ms: f64,

    /// When the stage was dispatched.
    pub started_at: DateTime<Utc>,

    /// When the stage finished.
    pub finished_at: DateTime<Utc>,
}

impl StageResult {
    /// Creates a `Skipped` result for a stage that was never dispatched.
    #[must_use]
    pub fn skipped(stage: impl Into<String>, reason: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            stage: stage.into(),
            status: StageStatus::Skipped,
            output: String::new(),
            error: Some(reason.into()),
            duration_ms: 0.0,
            started_at: now,
            finished_at: now,
        }
    }

    /// Returns true if the stage reported an error.
    #[must_use]
    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Tracks a stage from dispatch to finalization.
///
/// Created at dispatch time so the result carries accurate start/duration
/// values; consumed by [`StageRecorder::finish`] so a result cannot be
/// finalized twice.
#[derive(Debug)]
pub struct StageRecorder {
    stage: String,
    started_at: DateTime<Utc>,
    start: Instant,
}

impl StageRecorder {
    /// Starts recording a stage.
    #[must_use]
    pub fn begin(stage: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            started_at: Utc::now(),
            start: Instant::now(),
        }
    }

    /// Returns the stage name being recorded.
    #[must_use]
    pub fn stage(&self) -> &str {
        &self.stage
    }

    /// Finalizes the record with the gate-assigned status.
    #[must_use]
    pub fn finish(
        self,
        status: StageStatus,
        output: impl Into<String>,
        error: Option<String>,
    ) -> StageResult {
        StageResult {
            stage: self.stage,
            status,
            output: output.into(),
            error,
            duration_ms: self.start.elapsed().as_secs_f64() * 1000.0,
            started_at: self.started_at,
            finished_at: Utc::now(),
        }
    }
}
