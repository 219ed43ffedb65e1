//! Tool-backed stages.
//!
//! A [`ToolStage`] wraps one external tool behind the stage contract: it
//! composes an immutable [`StepSpec`], hands it to the substrate in a
//! single call, and classifies the exit code through its declared
//! [`OutcomeRule`].

use super::{OutcomeClass, Stage, StageOutcome};
use crate::context::{ArtifactStore, RunContext};
use crate::core::RunArtifact;
use crate::errors::InfrastructureError;
use crate::step::StepSpec;
use crate::substrate::{StepResult, Substrate};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// Composes the step a tool stage will run, given the run context and the
/// artifacts produced so far.
pub type StepComposer =
    Arc<dyn Fn(&RunContext, &ArtifactStore) -> Result<StepSpec, InfrastructureError> + Send + Sync>;

/// Collects artifacts out of a completed step.
pub type ArtifactCollector =
    Arc<dyn Fn(&RunContext, &ArtifactStore, &StepResult) -> Vec<RunArtifact> + Send + Sync>;

/// A stage's declared mapping from tool exit codes to outcome classes.
///
/// Several tools use the same non-zero exit both for "ran correctly and
/// found issues" and "could not run"; the rule disambiguates this up front
/// instead of guessing from the outcome shape. Exit codes a rule does not
/// list as findings classify as execution failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutcomeRule {
    /// Every non-zero exit is a finding (build and test tools, where the
    /// failure *is* the meaningful result).
    NonZeroIsFindings,
    /// Only the listed exit codes are findings; any other non-zero exit is
    /// an execution failure (scanners with documented finding codes).
    FindingCodes(Vec<i32>),
    /// The tool never gates; any non-zero exit is an execution failure
    /// (generators such as SBOM tooling).
    NonZeroIsExecutionFailure,
}

impl OutcomeRule {
    /// Classifies a tool exit code.
    #[must_use]
    pub fn classify(&self, exit_code: i32) -> OutcomeClass {
        if exit_code == 0 {
            return OutcomeClass::Passed;
        }
        match self {
            Self::NonZeroIsFindings => OutcomeClass::Findings,
            Self::FindingCodes(codes) => {
                if codes.contains(&exit_code) {
                    OutcomeClass::Findings
                } else {
                    OutcomeClass::ExecutionFailure
                }
            }
            Self::NonZeroIsExecutionFailure => OutcomeClass::ExecutionFailure,
        }
    }
}

/// A stage that runs one tool through the execution substrate.
pub struct ToolStage {
    name: String,
    rule: OutcomeRule,
    substrate: Arc<dyn Substrate>,
    composer: StepComposer,
    collector: Option<ArtifactCollector>,
}

impl ToolStage {
    /// Creates a tool stage.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        rule: OutcomeRule,
        substrate: Arc<dyn Substrate>,
        composer: StepComposer,
    ) -> Self {
        Self {
            name: name.into(),
            rule,
            substrate,
            composer,
            collector: None,
        }
    }

    /// Attaches an artifact collector, run after a non-failing step.
    #[must_use]
    pub fn with_collector(mut self, collector: ArtifactCollector) -> Self {
        self.collector = Some(collector);
        self
    }

    /// The stage's outcome rule.
    #[must_use]
    pub fn rule(&self) -> &OutcomeRule {
        &self.rule
    }
}

impl fmt::Debug for ToolStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolStage")
            .field("name", &self.name)
            .field("rule", &self.rule)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Stage for ToolStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &RunContext, artifacts: &ArtifactStore) -> StageOutcome {
        let step = match (self.composer)(ctx, artifacts) {
            Ok(step) => step,
            Err(err) => {
                return StageOutcome::execution_failure(err.in_stage(&self.name).to_string());
            }
        };

        tracing::debug!(stage = %self.name, image = %step.image, "dispatching step");

        let result = match self.substrate.run_step(&step).await {
            Ok(result) => result,
            Err(err) => {
                return StageOutcome::execution_failure(err.in_stage(&self.name).to_string());
            }
        };

        match self.rule.classify(result.exit_code) {
            OutcomeClass::Passed => {
                let mut outcome = StageOutcome::passed(result.output.clone());
                if let Some(collector) = &self.collector {
                    outcome = outcome.with_artifacts(collector(ctx, artifacts, &result));
                }
                outcome
            }
            OutcomeClass::Findings => StageOutcome::findings(
                result.output.clone(),
                format!("'{}' exited with code {}", self.name, result.exit_code),
            ),
            OutcomeClass::ExecutionFailure => StageOutcome::execution_failure(format!(
                "'{}' could not run (exit code {})",
                self.name, result.exit_code
            ))
            .with_output(result.output),
        }
    }
}
