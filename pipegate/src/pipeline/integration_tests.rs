//! End-to-end runner tests: gate semantics, service lifecycle, report
//! guarantees.

use super::{PipelineBuilder, PipelineRunner};
use crate::config::{RunProfile, SecretValue};
use crate::core::{ArtifactKind, GatePolicy, RunArtifact, RunStatus, StageStatus};
use crate::errors::PipelineError;
use crate::events::CollectingEventSink;
use crate::services::{ServiceKind, ServiceProvisioner};
use crate::stages::{Catalog, FnStage, StageOutcome, StageSpec};
use crate::testing::{
    failing_stage, finding_stage, passing_stage, test_config, InstantProbe, NeverReadyProbe,
    ScriptedSubstrate, StaticLauncher,
};
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

fn spec(name: &str, policy: GatePolicy, stage: Arc<dyn crate::stages::Stage>) -> StageSpec {
    StageSpec::new(name, policy, stage)
}

fn runner_for(stages: Vec<StageSpec>) -> PipelineRunner {
    let plan = PipelineBuilder::new("security-pipeline")
        .stages(stages)
        .unwrap()
        .build()
        .unwrap();
    let provisioner =
        ServiceProvisioner::new(Arc::new(StaticLauncher::new()), Arc::new(InstantProbe));
    PipelineRunner::new(plan, provisioner)
}

fn five_stages_with(index: usize, policy: GatePolicy) -> Vec<StageSpec> {
    (1..=5)
        .map(|i| {
            let name = format!("stage-{i}");
            if i == index {
                spec(&name, policy, finding_stage(&name))
            } else {
                spec(&name, GatePolicy::Hard, passing_stage(&name))
            }
        })
        .collect()
}

// Scenario A: a hard failure mid-run fails its stage, skips the rest, and
// aborts the run.
#[tokio::test]
async fn hard_failure_skips_remaining_stages() {
    let runner = runner_for(five_stages_with(3, GatePolicy::Hard));
    let outcome = runner.run(test_config()).await.unwrap();

    let statuses: Vec<_> = outcome.report.entries.iter().map(|e| e.status).collect();
    assert_eq!(
        statuses,
        vec![
            StageStatus::Success,
            StageStatus::Success,
            StageStatus::Failed,
            StageStatus::Skipped,
            StageStatus::Skipped,
        ]
    );
    assert_eq!(outcome.report.status, RunStatus::Aborted);
    assert_eq!(outcome.report.first_failure.as_deref(), Some("stage-3"));

    let abort = outcome.abort.unwrap();
    assert_eq!(abort.stage, "stage-3");
    assert!(matches!(abort.error, PipelineError::StageExecution(_)));
}

// Scenario B: a soft failure records a warning, later stages still run,
// and the run completes with the warnings flag set.
#[tokio::test]
async fn soft_failure_warns_and_continues() {
    let runner = runner_for(five_stages_with(2, GatePolicy::Soft));
    let outcome = runner.run(test_config()).await.unwrap();

    assert!(outcome.is_success());
    assert_eq!(outcome.report.status, RunStatus::Completed);
    assert!(outcome.report.has_warnings);
    assert_eq!(outcome.report.entry("stage-2").unwrap().status, StageStatus::Warning);
    assert_eq!(outcome.report.count_with_status(StageStatus::Success), 4);
    assert_eq!(outcome.report.count_with_status(StageStatus::Skipped), 0);
}

// P2: a clean run completes with every stage successful.
#[tokio::test]
async fn clean_run_completes() {
    let stages = (1..=5)
        .map(|i| {
            let name = format!("stage-{i}");
            spec(&name, GatePolicy::Hard, passing_stage(&name))
        })
        .collect();
    let runner = runner_for(stages);
    let outcome = runner.run(test_config()).await.unwrap();

    assert_eq!(outcome.report.status, RunStatus::Completed);
    assert!(!outcome.report.has_warnings);
    assert_eq!(outcome.report.count_with_status(StageStatus::Success), 5);
    assert!(outcome.report.first_failure.is_none());
}

// An informational stage's findings are recorded but never fail the stage.
#[tokio::test]
async fn informational_findings_still_succeed() {
    let stages = vec![
        spec("iac-scan", GatePolicy::Informational, finding_stage("iac-scan")),
        spec("build", GatePolicy::Hard, passing_stage("build")),
    ];
    let runner = runner_for(stages);
    let outcome = runner.run(test_config()).await.unwrap();

    let entry = outcome.report.entry("iac-scan").unwrap();
    assert_eq!(entry.status, StageStatus::Success);
    assert!(entry.error.is_some());
    assert_eq!(outcome.report.status, RunStatus::Completed);
    assert!(!outcome.report.has_warnings);
}

// An execution failure aborts even under a soft policy.
#[tokio::test]
async fn execution_failure_ignores_soft_policy() {
    let stages = vec![
        spec("sbom", GatePolicy::Soft, failing_stage("sbom")),
        spec("package", GatePolicy::Hard, passing_stage("package")),
    ];
    let runner = runner_for(stages);
    let outcome = runner.run(test_config()).await.unwrap();

    assert_eq!(outcome.report.status, RunStatus::Aborted);
    assert_eq!(outcome.report.entry("sbom").unwrap().status, StageStatus::Failed);
    assert_eq!(outcome.report.entry("package").unwrap().status, StageStatus::Skipped);
    assert!(matches!(
        outcome.abort.unwrap().error,
        PipelineError::Infrastructure(_)
    ));
}

// Scenario C: a readiness deadline miss raises ServiceUnavailable and the
// dependent stage never executes.
#[tokio::test]
async fn service_deadline_aborts_before_stage_executes() {
    let executed = Arc::new(AtomicBool::new(false));
    let executed_probe = executed.clone();
    let deploy = Arc::new(FnStage::new("deploy-app", move |_, _| {
        executed_probe.store(true, Ordering::SeqCst);
        StageOutcome::passed("deployed")
    }));

    let stages = vec![
        spec("build", GatePolicy::Hard, passing_stage("build")),
        spec("deploy-app", GatePolicy::Hard, deploy).with_service(ServiceKind::Cluster),
        spec("dast-scan", GatePolicy::Hard, passing_stage("dast-scan")),
    ];
    let plan = PipelineBuilder::new("security-pipeline")
        .stages(stages)
        .unwrap()
        .build()
        .unwrap();
    let provisioner =
        ServiceProvisioner::new(Arc::new(StaticLauncher::new()), Arc::new(NeverReadyProbe));
    let runner = PipelineRunner::new(plan, provisioner);

    let outcome = runner.run(test_config()).await.unwrap();

    assert!(!executed.load(Ordering::SeqCst));
    assert_eq!(outcome.report.status, RunStatus::Aborted);
    assert_eq!(outcome.report.entry("deploy-app").unwrap().status, StageStatus::Failed);
    assert_eq!(outcome.report.entry("dast-scan").unwrap().status, StageStatus::Skipped);
    assert!(matches!(
        outcome.abort.unwrap().error,
        PipelineError::ServiceUnavailable(_)
    ));
}

// Scenario D / P3: two stages acquiring the same kind share one instance
// and see the same endpoint.
#[tokio::test]
async fn service_acquisition_is_idempotent_across_stages() {
    let endpoint_stage = |name: &str| {
        Arc::new(FnStage::new(name, |ctx, _| {
            match ctx.endpoint(ServiceKind::Registry) {
                Some(endpoint) => StageOutcome::passed(endpoint.as_str().to_string()),
                None => StageOutcome::execution_failure("registry endpoint missing"),
            }
        }))
    };

    let stages = vec![
        spec("push", GatePolicy::Hard, endpoint_stage("push")).with_service(ServiceKind::Registry),
        spec("verify-push", GatePolicy::Hard, endpoint_stage("verify-push"))
            .with_service(ServiceKind::Registry),
    ];
    let plan = PipelineBuilder::new("security-pipeline")
        .stages(stages)
        .unwrap()
        .build()
        .unwrap();
    let launcher = Arc::new(StaticLauncher::new());
    let provisioner = ServiceProvisioner::new(launcher.clone(), Arc::new(InstantProbe));
    let runner = PipelineRunner::new(plan, provisioner);

    let outcome = runner.run(test_config()).await.unwrap();

    assert_eq!(outcome.report.status, RunStatus::Completed);
    assert_eq!(launcher.launch_count(ServiceKind::Registry), 1);
    let push = &outcome.report.entry("push").unwrap().output;
    let verify = &outcome.report.entry("verify-push").unwrap().output;
    assert_eq!(push, verify);
    // Teardown ran for the single instance.
    assert_eq!(launcher.shutdown_count(), 1);
}

// Artifacts produced by one stage are visible to the next before it runs.
#[tokio::test]
async fn artifacts_thread_forward_in_order() {
    let producer = Arc::new(FnStage::new("package", |_, _| {
        StageOutcome::passed("packaged").with_artifact(RunArtifact::new(
            ArtifactKind::Package,
            "search-api",
            "search-api.tar",
        ))
    }));
    let consumer = Arc::new(FnStage::new("image-scan", |_, artifacts| {
        match artifacts.latest(ArtifactKind::Package) {
            Some(package) => StageOutcome::passed(format!("scanned {}", package.reference)),
            None => StageOutcome::execution_failure("package artifact missing"),
        }
    }));

    let stages = vec![
        spec("package", GatePolicy::Hard, producer).produces(ArtifactKind::Package),
        spec("image-scan", GatePolicy::Hard, consumer).with_need(ArtifactKind::Package),
    ];
    let runner = runner_for(stages);
    let outcome = runner.run(test_config()).await.unwrap();

    assert_eq!(outcome.report.status, RunStatus::Completed);
    assert_eq!(
        outcome.report.entry("image-scan").unwrap().output,
        "scanned search-api.tar"
    );
    let package = outcome.artifacts.get(ArtifactKind::Package, "search-api").unwrap();
    assert_eq!(package.produced_by, "package");
}

// A failing stage's artifacts are not threaded to later stages.
#[tokio::test]
async fn failed_stage_artifacts_are_dropped() {
    let producer = Arc::new(FnStage::new("package", |_, _| {
        StageOutcome::findings("broken build", "compile error").with_artifact(RunArtifact::new(
            ArtifactKind::Package,
            "search-api",
            "search-api.tar",
        ))
    }));
    let stages = vec![spec("package", GatePolicy::Hard, producer)];
    let runner = runner_for(stages);
    let outcome = runner.run(test_config()).await.unwrap();

    assert_eq!(outcome.report.status, RunStatus::Aborted);
    assert!(outcome.artifacts.is_empty());
}

// Configuration errors surface before the run enters Running: no report.
#[tokio::test]
async fn invalid_config_never_starts_the_run() {
    let runner = runner_for(vec![spec("build", GatePolicy::Hard, passing_stage("build"))]);
    let mut config = test_config();
    config.target = String::new();

    let err = runner.run(config).await.unwrap_err();
    assert_eq!(err.field.as_deref(), Some("target"));
}

// P4: report entries appear in stage order and every stage is accounted
// for, even after an abort.
#[tokio::test]
async fn report_covers_every_stage_in_order() {
    let runner = runner_for(five_stages_with(1, GatePolicy::Hard));
    let outcome = runner.run(test_config()).await.unwrap();

    let names: Vec<_> = outcome
        .report
        .entries
        .iter()
        .map(|e| e.stage.clone())
        .collect();
    assert_eq!(names, vec!["stage-1", "stage-2", "stage-3", "stage-4", "stage-5"]);
    // Raw output of the dispatched stage is preserved verbatim.
    assert_eq!(outcome.report.entries[0].output, "{}");
}

// Lifecycle events arrive in dispatch order through the run context's sink.
#[tokio::test]
async fn lifecycle_events_are_emitted_in_order() {
    let sink = Arc::new(CollectingEventSink::new());
    let stages = vec![
        spec("secret-scan", GatePolicy::Hard, passing_stage("secret-scan")),
        spec("sast-scan", GatePolicy::Hard, finding_stage("sast-scan")),
        spec("build", GatePolicy::Hard, passing_stage("build")),
    ];
    let plan = PipelineBuilder::new("security-pipeline")
        .stages(stages)
        .unwrap()
        .build()
        .unwrap();
    let provisioner =
        ServiceProvisioner::new(Arc::new(StaticLauncher::new()), Arc::new(InstantProbe));
    let runner = PipelineRunner::new(plan, provisioner).with_event_sink(sink.clone());

    let outcome = runner.run(test_config()).await.unwrap();
    assert_eq!(outcome.report.status, RunStatus::Aborted);

    assert_eq!(
        sink.event_types(),
        vec![
            "run.started",
            "stage.started",
            "stage.completed",
            "stage.started",
            "stage.failed",
            "stage.skipped",
            "run.aborted",
        ]
    );
}

// The full catalog runs end to end against a scripted substrate.
#[tokio::test]
async fn full_catalog_run_completes() {
    crate::testing::init_test_logging();
    let substrate = Arc::new(ScriptedSubstrate::new());
    let catalog = Catalog::new(substrate.clone());
    let config = test_config()
        .with_signing_key(SecretValue::new("cosign-key"), SecretValue::new("cosign-pass"));

    let stages = catalog.resolve(&config).unwrap();
    let plan = PipelineBuilder::new("security-pipeline")
        .stages(stages)
        .unwrap()
        .build()
        .unwrap();
    let provisioner =
        ServiceProvisioner::new(Arc::new(StaticLauncher::new()), Arc::new(InstantProbe));
    let runner = PipelineRunner::new(plan, provisioner);

    let outcome = runner.run(config).await.unwrap();

    assert_eq!(outcome.report.status, RunStatus::Completed);
    assert_eq!(outcome.report.entries.len(), 22);
    assert!(outcome.artifacts.contains(ArtifactKind::Package));
    assert!(outcome.artifacts.contains(ArtifactKind::ImageReference));
    assert!(outcome.artifacts.contains(ArtifactKind::SignedReference));
    assert!(outcome.artifacts.contains(ArtifactKind::Sbom));

    let image = outcome.artifacts.latest(ArtifactKind::ImageReference).unwrap();
    assert_eq!(image.reference, "registry:5000/search-api:latest");
}

// A hard scanner finding in the catalog aborts the run and skips the rest.
#[tokio::test]
async fn catalog_run_aborts_on_scanner_findings() {
    let substrate = Arc::new(ScriptedSubstrate::new().respond(
        "aquasec/trivy:latest",
        crate::substrate::StepResult::with_exit_code(1, "CVE-2024-0001: HIGH"),
    ));
    let catalog = Catalog::new(substrate);
    let config = test_config().with_profile(RunProfile::Quick);

    let stages = catalog.resolve(&config).unwrap();
    let plan = PipelineBuilder::new("security-pipeline")
        .stages(stages)
        .unwrap()
        .build()
        .unwrap();
    let provisioner =
        ServiceProvisioner::new(Arc::new(StaticLauncher::new()), Arc::new(InstantProbe));
    let runner = PipelineRunner::new(plan, provisioner);

    let outcome = runner.run(config).await.unwrap();

    assert_eq!(outcome.report.status, RunStatus::Aborted);
    // Trivy backs dependency-scan first; its finding is the first failure.
    assert_eq!(outcome.report.first_failure.as_deref(), Some("dependency-scan"));
    let entry = outcome.report.entry("dependency-scan").unwrap();
    assert_eq!(entry.status, StageStatus::Failed);
    assert_eq!(entry.output, "CVE-2024-0001: HIGH");
    // Everything after the failing gate is skipped, never silently dropped.
    assert_eq!(
        outcome.report.count_with_status(StageStatus::Skipped),
        outcome.report.entries.len()
            - outcome
                .report
                .entries
                .iter()
                .position(|e| e.stage == "dependency-scan")
                .unwrap()
            - 1
    );
}
