//! Status and policy enums for stages and runs.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The enforcement policy declared by a stage.
///
/// The policy controls what happens to the run when the stage reports
/// findings. Infrastructure-level failures ignore the declared policy and
/// always abort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatePolicy {
    /// Findings abort the run.
    Hard,
    /// Findings are recorded as warnings; the run continues.
    Soft,
    /// Findings are recorded but the stage still counts as successful.
    Informational,
}

impl fmt::Display for GatePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hard => write!(f, "hard"),
            Self::Soft => write!(f, "soft"),
            Self::Informational => write!(f, "informational"),
        }
    }
}

/// The final status of one stage within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Stage completed without enforced findings.
    Success,
    /// Stage reported findings under a soft policy.
    Warning,
    /// Stage failed under a hard policy, or could not run at all.
    Failed,
    /// Stage was never dispatched because an earlier stage aborted the run.
    Skipped,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Warning => write!(f, "warning"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

impl StageStatus {
    /// Returns true if the status lets the run continue.
    #[must_use]
    pub fn is_passing(&self) -> bool {
        matches!(self, Self::Success | Self::Warning)
    }

    /// Returns true if the stage actually ran.
    #[must_use]
    pub fn was_dispatched(&self) -> bool {
        !matches!(self, Self::Skipped)
    }
}

/// The overall status of a pipeline run.
///
/// `Completed` with warnings is still a successful run, distinct from
/// `Aborted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every stage was dispatched and none aborted the run.
    Completed,
    /// A hard failure halted dispatch before the final stage.
    Aborted,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}
