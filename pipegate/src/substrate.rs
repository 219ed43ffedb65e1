//! The execution substrate boundary.
//!
//! The substrate runs a [`StepSpec`] in isolation and reports the raw
//! outcome. The orchestrator treats it as an opaque synchronous call:
//! substrate-level caching or retries are outside this crate.

use crate::errors::InfrastructureError;
use crate::step::StepSpec;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// The raw outcome of one step execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    /// The process exit code reported by the tool.
    pub exit_code: i32,

    /// Combined tool output, preserved verbatim.
    pub output: String,
}

impl StepResult {
    /// Creates a successful result.
    #[must_use]
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            output: output.into(),
        }
    }

    /// Creates a result with the given exit code.
    #[must_use]
    pub fn with_exit_code(exit_code: i32, output: impl Into<String>) -> Self {
        Self {
            exit_code,
            output: output.into(),
        }
    }

    /// Returns true if the tool exited cleanly.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs steps on behalf of stages.
///
/// An `Err` from [`Substrate::run_step`] means the step could not be
/// dispatched at all; a tool that ran and exited non-zero is an `Ok` with
/// that exit code. The distinction feeds the gate enforcer: dispatch
/// failures are always hard.
#[async_trait]
pub trait Substrate: Send + Sync {
    /// Runs the step to completion and returns its raw result.
    async fn run_step(&self, step: &StepSpec) -> Result<StepResult, InfrastructureError>;
}
