//! The top-level state machine driving one run.

use super::PipelinePlan;
use crate::config::RunConfig;
use crate::context::{ArtifactStore, RunContext, RunIdentity};
use crate::core::{RunStatus, StageRecorder, StageResult, StageStatus};
use crate::errors::{ConfigError, InfrastructureError, PipelineError, StageExecutionError};
use crate::events::{EventSink, NoOpEventSink};
use crate::gate::GateEnforcer;
use crate::report::{Report, ReportAggregator};
use crate::services::ServiceProvisioner;
use crate::stages::{OutcomeClass, StageOutcome, StageSpec};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The runner's position in the run lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    /// The stage list is resolved; nothing dispatched yet.
    NotStarted,
    /// Dispatching the stage at this index.
    Running(usize),
    /// A hard failure at this index halted dispatch.
    Aborted(usize),
    /// The final stage's result was processed without abort.
    Completed,
}

/// Why a run aborted.
#[derive(Debug)]
pub struct AbortCause {
    /// The first hard-failing stage.
    pub stage: String,
    /// The error behind the failure.
    pub error: PipelineError,
}

/// What a run hands back: the report is always present, partial on abort.
#[derive(Debug)]
pub struct RunOutcome {
    /// The finalized report; never silently drops earlier results.
    pub report: Report,
    /// Every artifact produced before completion or abort.
    pub artifacts: ArtifactStore,
    /// The first hard failure, when the run aborted.
    pub abort: Option<AbortCause>,
}

impl RunOutcome {
    /// Returns true if the run completed, warnings included.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.abort.is_none()
    }
}

/// Drives one pipeline run to completion or abort.
///
/// Dispatch is strictly sequential: stage N's artifacts are visible to
/// stage N+1 before it begins, and report entries appear in stage order.
/// The runner is the single writer of the report; stages never touch it.
pub struct PipelineRunner {
    plan: PipelinePlan,
    provisioner: ServiceProvisioner,
    sink: Arc<dyn EventSink>,
}

impl PipelineRunner {
    /// Creates a runner for a plan.
    #[must_use]
    pub fn new(plan: PipelinePlan, provisioner: ServiceProvisioner) -> Self {
        Self {
            plan,
            provisioner,
            sink: Arc::new(NoOpEventSink),
        }
    }

    /// Sets the event sink used for run observability.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// The plan this runner executes.
    #[must_use]
    pub fn plan(&self) -> &PipelinePlan {
        &self.plan
    }

    /// Runs the pipeline.
    ///
    /// On abort the partial report is still returned, together with the
    /// first hard failure. Backing services are torn down best-effort on
    /// both paths.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] only when configuration is invalid; in that
    /// case the run never starts and no report exists.
    pub async fn run(&self, config: RunConfig) -> Result<RunOutcome, ConfigError> {
        config.validate()?;

        let pipeline = self.plan.name().to_string();
        let ctx = RunContext::new(RunIdentity::new(), config).with_event_sink(self.sink.clone());
        let mut aggregator = ReportAggregator::new(&pipeline, ctx.run_id());
        let mut artifacts = ArtifactStore::new();
        let mut abort: Option<AbortCause> = None;

        let mut state = RunState::NotStarted;
        debug!(state = ?state, "stage list resolved");
        info!(pipeline = %pipeline, run_id = %ctx.run_id(), stages = self.plan.stage_count(), "run starting");
        ctx.try_emit_event(
            "run.started",
            Some(serde_json::json!({
                "pipeline": pipeline,
                "run_id": ctx.run_id(),
                "stages": self.plan.stage_count(),
            })),
        );

        for (index, spec) in self.plan.stages().iter().enumerate() {
            if let Some(cause) = &abort {
                let result =
                    StageResult::skipped(&spec.name, format!("aborted by stage '{}'", cause.stage));
                ctx.try_emit_event(
                    "stage.skipped",
                    Some(serde_json::json!({ "stage": spec.name, "after": cause.stage })),
                );
                aggregator.append(result);
                continue;
            }

            state = RunState::Running(index);
            debug!(state = ?state, stage = %spec.name, "dispatching");
            ctx.try_emit_event(
                "stage.started",
                Some(serde_json::json!({ "stage": spec.name, "index": index })),
            );
            let recorder = StageRecorder::begin(&spec.name);

            if let Err(err) = self.prepare_services(spec, &ctx).await {
                // No stage can depend on an unreachable service; always hard.
                let verdict = GateEnforcer::classify_undispatchable();
                warn!(stage = %spec.name, error = %err, "service acquisition failed");
                aggregator.append(recorder.finish(verdict.status, "", Some(err.to_string())));
                ctx.try_emit_event(
                    "stage.failed",
                    Some(serde_json::json!({ "stage": spec.name, "error": err.to_string() })),
                );
                abort = Some(AbortCause {
                    stage: spec.name.clone(),
                    error: err,
                });
                state = RunState::Aborted(index);
                debug!(state = ?state, "state transition");
                continue;
            }

            let outcome = spec.runner.execute(&ctx, &artifacts).await;
            let verdict = GateEnforcer::classify(&outcome, spec.policy);
            aggregator.append(recorder.finish(
                verdict.status,
                outcome.output.clone(),
                outcome.error.clone(),
            ));
            ctx.try_emit_event(
                match verdict.status {
                    StageStatus::Success => "stage.completed",
                    StageStatus::Warning => "stage.warning",
                    _ => "stage.failed",
                },
                Some(serde_json::json!({
                    "stage": spec.name,
                    "status": verdict.status,
                    "policy": spec.policy,
                })),
            );

            if verdict.continues() {
                if let Err(err) = record_artifacts(&mut artifacts, &spec.name, outcome) {
                    warn!(stage = %spec.name, error = %err, "artifact recording failed");
                    abort = Some(AbortCause {
                        stage: spec.name.clone(),
                        error: err.into(),
                    });
                    state = RunState::Aborted(index);
                    debug!(state = ?state, "state transition");
                }
            } else {
                abort = Some(AbortCause {
                    stage: spec.name.clone(),
                    error: failure_error(spec, &outcome),
                });
                state = RunState::Aborted(index);
                debug!(state = ?state, "state transition");
            }
        }

        // Cleanup never affects the run's final status.
        self.provisioner.release_all().await;

        let status = if abort.is_some() {
            RunStatus::Aborted
        } else {
            state = RunState::Completed;
            debug!(state = ?state, "state transition");
            RunStatus::Completed
        };
        ctx.try_emit_event(
            match status {
                RunStatus::Completed => "run.completed",
                RunStatus::Aborted => "run.aborted",
            },
            Some(serde_json::json!({
                "pipeline": pipeline,
                "first_failure": aggregator.first_failure(),
            })),
        );
        info!(pipeline = %pipeline, status = %status, entries = aggregator.len(), "run finished");

        Ok(RunOutcome {
            report: aggregator.finalize(status),
            artifacts,
            abort,
        })
    }

    /// Acquires and binds every service the stage declares, in order.
    async fn prepare_services(
        &self,
        spec: &StageSpec,
        ctx: &RunContext,
    ) -> Result<(), PipelineError> {
        for kind in &spec.services {
            let handle = self.provisioner.acquire(*kind, ctx.config()).await?;
            self.provisioner.bind_to(&handle, &spec.name, ctx);
        }
        Ok(())
    }
}

impl std::fmt::Debug for PipelineRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineRunner")
            .field("plan", &self.plan.name())
            .field("stages", &self.plan.stage_count())
            .finish_non_exhaustive()
    }
}

fn record_artifacts(
    artifacts: &mut ArtifactStore,
    stage: &str,
    outcome: StageOutcome,
) -> Result<(), InfrastructureError> {
    for artifact in outcome.artifacts {
        artifacts
            .insert(artifact.produced_by(stage))
            .map_err(|e| InfrastructureError::new(e.to_string()).in_stage(stage))?;
    }
    Ok(())
}

fn failure_error(spec: &StageSpec, outcome: &StageOutcome) -> PipelineError {
    let message = outcome
        .error
        .clone()
        .unwrap_or_else(|| "stage failed without detail".to_string());
    if outcome.class == OutcomeClass::ExecutionFailure {
        InfrastructureError::new(message).in_stage(&spec.name).into()
    } else {
        StageExecutionError::new(&spec.name, message).into()
    }
}
