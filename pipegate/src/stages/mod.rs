//! The stage contract and its implementations.
//!
//! A stage is one operation in the pipeline (build, scan, deploy, test).
//! The contract decouples the orchestrator from stage internals so
//! heterogeneous operations can be sequenced uniformly: the runner awaits
//! [`Stage::execute`] exactly once per stage and never retries.

mod catalog;
mod spec;
mod tool;

pub use catalog::Catalog;
pub use spec::StageSpec;
pub use tool::{ArtifactCollector, OutcomeRule, StepComposer, ToolStage};

use crate::context::{ArtifactStore, RunContext};
use crate::core::RunArtifact;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::Debug;

/// How a stage classifies its own outcome.
///
/// Each stage declares, ahead of time, which outcomes are findings
/// (subject to its gate policy) versus execution failures (always hard).
/// The orchestrator never infers intent from outcome shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeClass {
    /// The operation ran and reported nothing to enforce.
    Passed,
    /// The operation ran correctly and reported real findings.
    Findings,
    /// The operation could not run or crashed before producing a result.
    ExecutionFailure,
}

impl fmt::Display for OutcomeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Passed => write!(f, "passed"),
            Self::Findings => write!(f, "findings"),
            Self::ExecutionFailure => write!(f, "execution_failure"),
        }
    }
}

/// What a stage hands back to the orchestrator.
#[derive(Debug, Clone)]
pub struct StageOutcome {
    /// The stage's own classification of what happened.
    pub class: OutcomeClass,
    /// Raw tool output, preserved verbatim into the report.
    pub output: String,
    /// Error text accompanying findings or failures.
    pub error: Option<String>,
    /// Artifacts produced by the stage, recorded by the runner.
    pub artifacts: Vec<RunArtifact>,
}

impl StageOutcome {
    /// Creates a passing outcome.
    #[must_use]
    pub fn passed(output: impl Into<String>) -> Self {
        Self {
            class: OutcomeClass::Passed,
            output: output.into(),
            error: None,
            artifacts: Vec::new(),
        }
    }

    /// Creates a findings outcome; severity follows the stage's policy.
    #[must_use]
    pub fn findings(output: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            class: OutcomeClass::Findings,
            output: output.into(),
            error: Some(error.into()),
            artifacts: Vec::new(),
        }
    }

    /// Creates an execution-failure outcome; always hard.
    #[must_use]
    pub fn execution_failure(error: impl Into<String>) -> Self {
        Self {
            class: OutcomeClass::ExecutionFailure,
            output: String::new(),
            error: Some(error.into()),
            artifacts: Vec::new(),
        }
    }

    /// Attaches raw output to the outcome.
    #[must_use]
    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = output.into();
        self
    }

    /// Attaches a produced artifact.
    #[must_use]
    pub fn with_artifact(mut self, artifact: RunArtifact) -> Self {
        self.artifacts.push(artifact);
        self
    }

    /// Attaches produced artifacts.
    #[must_use]
    pub fn with_artifacts(mut self, artifacts: Vec<RunArtifact>) -> Self {
        self.artifacts.extend(artifacts);
        self
    }
}

/// Trait for pipeline stages.
///
/// Execution is synchronous from the orchestrator's point of view: the
/// future does not resolve until the operation has fully completed or
/// failed. Side effects (pushed artifacts, deployed workloads) are the
/// stage's own responsibility.
#[async_trait]
pub trait Stage: Send + Sync + Debug {
    /// Returns the name of the stage.
    fn name(&self) -> &str;

    /// Executes the stage against the run context and prior artifacts.
    async fn execute(&self, ctx: &RunContext, artifacts: &ArtifactStore) -> StageOutcome;
}

/// A simple function-based stage, mainly for tests and custom wiring.
pub struct FnStage<F>
where
    F: Fn(&RunContext, &ArtifactStore) -> StageOutcome + Send + Sync,
{
    name: String,
    func: F,
}

impl<F> FnStage<F>
where
    F: Fn(&RunContext, &ArtifactStore) -> StageOutcome + Send + Sync,
{
    /// Creates a new function-based stage.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Debug for FnStage<F>
where
    F: Fn(&RunContext, &ArtifactStore) -> StageOutcome + Send + Sync,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnStage").field("name", &self.name).finish()
    }
}

#[async_trait]
impl<F> Stage for FnStage<F>
where
    F: Fn(&RunContext, &ArtifactStore) -> StageOutcome + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &RunContext, artifacts: &ArtifactStore) -> StageOutcome {
        (self.func)(ctx, artifacts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunConfig;
    use crate::context::RunIdentity;
    use crate::core::ArtifactKind;

    fn test_ctx() -> RunContext {
        RunContext::new(RunIdentity::new(), RunConfig::new("search-api"))
    }

    #[test]
    fn test_outcome_constructors() {
        let passed = StageOutcome::passed("ok");
        assert_eq!(passed.class, OutcomeClass::Passed);
        assert!(passed.error.is_none());

        let findings = StageOutcome::findings("{}", "2 findings");
        assert_eq!(findings.class, OutcomeClass::Findings);
        assert_eq!(findings.error.as_deref(), Some("2 findings"));

        let failure = StageOutcome::execution_failure("tool crashed").with_output("partial");
        assert_eq!(failure.class, OutcomeClass::ExecutionFailure);
        assert_eq!(failure.output, "partial");
    }

    #[test]
    fn test_outcome_artifacts() {
        let outcome = StageOutcome::passed("ok")
            .with_artifact(RunArtifact::new(ArtifactKind::Package, "app", "image.tar"));
        assert_eq!(outcome.artifacts.len(), 1);
    }

    #[tokio::test]
    async fn test_fn_stage() {
        let stage = FnStage::new("unit-test", |_ctx, _artifacts| StageOutcome::passed("all green"));

        assert_eq!(stage.name(), "unit-test");

        let ctx = test_ctx();
        let outcome = stage.execute(&ctx, &ArtifactStore::new()).await;
        assert_eq!(outcome.class, OutcomeClass::Passed);
        assert_eq!(outcome.output, "all green");
    }

    #[tokio::test]
    async fn test_fn_stage_reads_artifacts() {
        let stage = FnStage::new("sign", |_ctx, artifacts| {
            match artifacts.latest(ArtifactKind::ImageReference) {
                Some(image) => StageOutcome::passed(format!("signed {}", image.reference)),
                None => StageOutcome::execution_failure("no image reference to sign"),
            }
        });

        let ctx = test_ctx();
        let mut store = ArtifactStore::new();
        store
            .insert(RunArtifact::new(
                ArtifactKind::ImageReference,
                "search-api",
                "registry:5000/search-api:latest",
            ))
            .unwrap();

        let outcome = stage.execute(&ctx, &store).await;
        assert_eq!(outcome.output, "signed registry:5000/search-api:latest");
    }

    #[test]
    fn test_outcome_class_display() {
        assert_eq!(OutcomeClass::Passed.to_string(), "passed");
        assert_eq!(OutcomeClass::ExecutionFailure.to_string(), "execution_failure");
    }
}
