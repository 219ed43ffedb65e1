//! Test doubles and fixtures.

use crate::config::RunConfig;
use crate::errors::InfrastructureError;
use crate::services::{Endpoint, ReadinessProbe, ServiceHandle, ServiceKind, ServiceLauncher};
use crate::stages::{FnStage, Stage, StageOutcome};
use crate::step::StepSpec;
use crate::substrate::{StepResult, Substrate};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// A substrate that replays scripted results keyed by tool image.
///
/// Unscripted images succeed with empty output, so a pipeline can run end
/// to end with only the interesting stages scripted.
#[derive(Debug, Default)]
pub struct ScriptedSubstrate {
    responses: RwLock<HashMap<String, StepResult>>,
    dispatch_failures: RwLock<Vec<String>>,
    dispatched: RwLock<Vec<StepSpec>>,
}

impl ScriptedSubstrate {
    /// Creates a substrate where every step succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts the result returned for an image.
    #[must_use]
    pub fn respond(self, image: impl Into<String>, result: StepResult) -> Self {
        self.responses.write().insert(image.into(), result);
        self
    }

    /// Makes dispatch itself fail for an image, as if the substrate were
    /// unreachable.
    #[must_use]
    pub fn fail_dispatch(self, image: impl Into<String>) -> Self {
        self.dispatch_failures.write().push(image.into());
        self
    }

    /// The steps dispatched so far, in order.
    #[must_use]
    pub fn dispatched(&self) -> Vec<StepSpec> {
        self.dispatched.read().clone()
    }

    /// How many steps ran against the given image.
    #[must_use]
    pub fn dispatch_count(&self, image: &str) -> usize {
        self.dispatched
            .read()
            .iter()
            .filter(|s| s.image == image)
            .count()
    }
}

#[async_trait]
impl Substrate for ScriptedSubstrate {
    async fn run_step(&self, step: &StepSpec) -> Result<StepResult, InfrastructureError> {
        if self.dispatch_failures.read().contains(&step.image) {
            return Err(InfrastructureError::new(format!(
                "substrate unreachable for image '{}'",
                step.image
            )));
        }
        self.dispatched.write().push(step.clone());
        Ok(self
            .responses
            .read()
            .get(&step.image)
            .cloned()
            .unwrap_or_else(|| StepResult::success("")))
    }
}

/// A launcher handing out fixed endpoints and counting launches.
#[derive(Debug, Default)]
pub struct StaticLauncher {
    launches: RwLock<HashMap<ServiceKind, usize>>,
    shutdowns: RwLock<usize>,
    fail_shutdown: bool,
    fail_launch: bool,
}

impl StaticLauncher {
    /// Creates a launcher with well-known endpoints per kind.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every shutdown report a failure.
    #[must_use]
    pub fn failing_shutdown(mut self) -> Self {
        self.fail_shutdown = true;
        self
    }

    /// Makes every launch fail, as if the host could not start services.
    #[must_use]
    pub fn failing_launch(mut self) -> Self {
        self.fail_launch = true;
        self
    }

    /// How many instances of the kind were launched.
    #[must_use]
    pub fn launch_count(&self, kind: ServiceKind) -> usize {
        self.launches.read().get(&kind).copied().unwrap_or(0)
    }

    /// How many shutdowns were attempted.
    #[must_use]
    pub fn shutdown_count(&self) -> usize {
        *self.shutdowns.read()
    }
}

#[async_trait]
impl ServiceLauncher for StaticLauncher {
    async fn launch(&self, kind: ServiceKind) -> Result<Endpoint, InfrastructureError> {
        if self.fail_launch {
            return Err(InfrastructureError::new(format!(
                "cannot start service '{kind}'"
            )));
        }
        *self.launches.write().entry(kind).or_insert(0) += 1;
        Ok(Endpoint::new(match kind {
            ServiceKind::Registry => "registry:5000",
            ServiceKind::Cluster => "k3s:6443",
            ServiceKind::DataStore => "datastore:8983",
        }))
    }

    async fn shutdown(&self, handle: &ServiceHandle) -> Result<(), InfrastructureError> {
        *self.shutdowns.write() += 1;
        if self.fail_shutdown {
            return Err(InfrastructureError::new(format!(
                "teardown of '{}' failed",
                handle.kind
            )));
        }
        Ok(())
    }
}

/// A probe that reports ready immediately.
#[derive(Debug, Clone, Copy, Default)]
pub struct InstantProbe;

#[async_trait]
impl ReadinessProbe for InstantProbe {
    async fn check(&self, _kind: ServiceKind, _endpoint: &Endpoint) -> bool {
        true
    }
}

/// A probe that never reports ready; acquisitions run into their deadline.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverReadyProbe;

#[async_trait]
impl ReadinessProbe for NeverReadyProbe {
    async fn check(&self, _kind: ServiceKind, _endpoint: &Endpoint) -> bool {
        false
    }
}

/// A stage that always passes.
#[must_use]
pub fn passing_stage(name: &str) -> Arc<dyn Stage> {
    Arc::new(FnStage::new(name, |_, _| StageOutcome::passed("ok")))
}

/// A stage that always reports findings.
#[must_use]
pub fn finding_stage(name: &str) -> Arc<dyn Stage> {
    let error = format!("'{name}' found issues");
    Arc::new(FnStage::new(name, move |_, _| {
        StageOutcome::findings("{}", error.clone())
    }))
}

/// A stage that cannot run at all.
#[must_use]
pub fn failing_stage(name: &str) -> Arc<dyn Stage> {
    let error = format!("'{name}' crashed before producing a result");
    Arc::new(FnStage::new(name, move |_, _| {
        StageOutcome::execution_failure(error.clone())
    }))
}

/// A valid configuration for tests.
#[must_use]
pub fn test_config() -> RunConfig {
    RunConfig::new("search-api")
        .with_readiness_deadline(std::time::Duration::from_millis(200))
        .with_readiness_poll_interval(std::time::Duration::from_millis(5))
}

/// Installs a compact tracing subscriber honoring `RUST_LOG`.
///
/// Safe to call from multiple tests; only the first call installs.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .compact()
        .try_init();
}
