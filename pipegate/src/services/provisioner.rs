//! Service lifecycle management for one run.

use super::{Endpoint, ReadinessProbe, ServiceHandle, ServiceKind, ServiceLauncher};
use crate::config::RunConfig;
use crate::context::RunContext;
use crate::errors::{PipelineError, ServiceUnavailable};
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Starts, reuses, and tears down ephemeral backing services.
///
/// Acquisition is idempotent per kind within a run: the first call launches
/// an instance and waits for readiness, later calls return the existing
/// handle. Teardown is best-effort and never changes a run's outcome.
pub struct ServiceProvisioner {
    launcher: Arc<dyn ServiceLauncher>,
    probe: Arc<dyn ReadinessProbe>,
    // One handle per kind per run; the lock spans launch-and-probe so a
    // second acquire for the same kind can never race a duplicate launch.
    handles: Mutex<HashMap<ServiceKind, Arc<ServiceHandle>>>,
}

impl ServiceProvisioner {
    /// Creates a provisioner over the given launcher and probe.
    #[must_use]
    pub fn new(launcher: Arc<dyn ServiceLauncher>, probe: Arc<dyn ReadinessProbe>) -> Self {
        Self {
            launcher,
            probe,
            handles: Mutex::new(HashMap::new()),
        }
    }

    /// Acquires a handle for the given service kind.
    ///
    /// Blocks until the readiness probe succeeds, for a new instance or an
    /// existing one, or until the configured deadline elapses.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceUnavailable`] (always hard) when readiness is not
    /// reached within the deadline, or an infrastructure error when the
    /// launcher cannot start the instance at all.
    pub async fn acquire(
        &self,
        kind: ServiceKind,
        config: &RunConfig,
    ) -> Result<Arc<ServiceHandle>, PipelineError> {
        let deadline = config.readiness_deadline;
        let poll_interval = config.readiness_poll_interval;
        let mut handles = self.handles.lock().await;

        if let Some(existing) = handles.get(&kind) {
            debug!(kind = %kind, endpoint = %existing.endpoint, "reusing service handle");
            self.wait_ready(kind, &existing.endpoint, deadline, poll_interval)
                .await?;
            return Ok(existing.clone());
        }

        info!(kind = %kind, "launching service");
        let endpoint = self.launcher.launch(kind).await?;
        self.wait_ready(kind, &endpoint, deadline, poll_interval)
            .await?;

        let handle = Arc::new(ServiceHandle::starting(kind, endpoint).ready());
        info!(kind = %kind, endpoint = %handle.endpoint, "service ready");
        handles.insert(kind, handle.clone());
        Ok(handle)
    }

    /// Exposes a handle's endpoint to a stage's execution environment.
    ///
    /// Records the endpoint in the run context, where it is read-only from
    /// the stage's perspective.
    pub fn bind_to(&self, handle: &ServiceHandle, stage: &str, ctx: &RunContext) -> Endpoint {
        debug!(kind = %handle.kind, stage = %stage, endpoint = %handle.endpoint, "binding service");
        ctx.record_endpoint(handle.kind, handle.endpoint.clone());
        ctx.try_emit_event(
            "service.bound",
            Some(serde_json::json!({
                "kind": handle.kind,
                "stage": stage,
                "endpoint": handle.endpoint.as_str(),
            })),
        );
        handle.endpoint.clone()
    }

    /// Releases the handle for one kind, best-effort.
    pub async fn release(&self, kind: ServiceKind) {
        let handle = self.handles.lock().await.remove(&kind);
        if let Some(handle) = handle {
            if let Err(err) = self.launcher.shutdown(&handle).await {
                warn!(kind = %kind, error = %err, "service teardown failed; continuing");
            }
        }
    }

    /// Releases every live handle, best-effort and concurrently.
    ///
    /// Teardown failures are logged and never propagated into the run's
    /// final status.
    pub async fn release_all(&self) {
        let handles: Vec<Arc<ServiceHandle>> =
            self.handles.lock().await.drain().map(|(_, h)| h).collect();

        let shutdowns = handles.iter().map(|handle| {
            let launcher = self.launcher.clone();
            async move {
                if let Err(err) = launcher.shutdown(handle).await {
                    warn!(kind = %handle.kind, error = %err, "service teardown failed; continuing");
                }
            }
        });
        join_all(shutdowns).await;
    }

    /// The number of live handles.
    pub async fn live_handles(&self) -> usize {
        self.handles.lock().await.len()
    }

    async fn wait_ready(
        &self,
        kind: ServiceKind,
        endpoint: &Endpoint,
        deadline: Duration,
        poll_interval: Duration,
    ) -> Result<(), ServiceUnavailable> {
        let wait = async {
            loop {
                if self.probe.check(kind, endpoint).await {
                    return;
                }
                tokio::time::sleep(poll_interval).await;
            }
        };

        match tokio::time::timeout(deadline, wait).await {
            Ok(()) => Ok(()),
            Err(_) => {
                warn!(kind = %kind, deadline_secs = deadline.as_secs_f64(), "readiness deadline elapsed");
                Err(ServiceUnavailable::new(kind, deadline.as_secs_f64()))
            }
        }
    }
}

impl std::fmt::Debug for ServiceProvisioner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceProvisioner").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_config, InstantProbe, NeverReadyProbe, StaticLauncher};

    fn provisioner() -> ServiceProvisioner {
        ServiceProvisioner::new(Arc::new(StaticLauncher::new()), Arc::new(InstantProbe))
    }

    #[tokio::test]
    async fn test_acquire_launches_and_probes() {
        let provisioner = provisioner();
        let handle = provisioner
            .acquire(ServiceKind::Registry, &test_config())
            .await
            .unwrap();

        assert!(handle.is_ready());
        assert_eq!(handle.kind, ServiceKind::Registry);
        assert_eq!(provisioner.live_handles().await, 1);
    }

    #[tokio::test]
    async fn test_acquire_is_idempotent_per_kind() {
        let launcher = Arc::new(StaticLauncher::new());
        let provisioner = ServiceProvisioner::new(launcher.clone(), Arc::new(InstantProbe));
        let config = test_config();

        let first = provisioner.acquire(ServiceKind::Registry, &config).await.unwrap();
        let second = provisioner.acquire(ServiceKind::Registry, &config).await.unwrap();

        assert_eq!(first.endpoint, second.endpoint);
        assert_eq!(launcher.launch_count(ServiceKind::Registry), 1);
    }

    #[tokio::test]
    async fn test_distinct_kinds_get_distinct_instances() {
        let launcher = Arc::new(StaticLauncher::new());
        let provisioner = ServiceProvisioner::new(launcher.clone(), Arc::new(InstantProbe));
        let config = test_config();

        provisioner.acquire(ServiceKind::Registry, &config).await.unwrap();
        provisioner.acquire(ServiceKind::Cluster, &config).await.unwrap();

        assert_eq!(provisioner.live_handles().await, 2);
        assert_eq!(launcher.launch_count(ServiceKind::Registry), 1);
        assert_eq!(launcher.launch_count(ServiceKind::Cluster), 1);
    }

    #[tokio::test]
    async fn test_readiness_deadline_raises_service_unavailable() {
        let provisioner =
            ServiceProvisioner::new(Arc::new(StaticLauncher::new()), Arc::new(NeverReadyProbe));

        let err = provisioner
            .acquire(ServiceKind::Cluster, &test_config())
            .await
            .unwrap_err();
        match err {
            PipelineError::ServiceUnavailable(inner) => {
                assert_eq!(inner.kind, ServiceKind::Cluster);
            }
            other => panic!("expected ServiceUnavailable, got {other:?}"),
        }
        assert_eq!(provisioner.live_handles().await, 0);
    }

    #[tokio::test]
    async fn test_launch_failure_is_infrastructure() {
        let provisioner = ServiceProvisioner::new(
            Arc::new(StaticLauncher::new().failing_launch()),
            Arc::new(InstantProbe),
        );

        let err = provisioner
            .acquire(ServiceKind::Registry, &test_config())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Infrastructure(_)));
    }

    #[tokio::test]
    async fn test_release_all_is_best_effort() {
        let launcher = Arc::new(StaticLauncher::new().failing_shutdown());
        let provisioner = ServiceProvisioner::new(launcher.clone(), Arc::new(InstantProbe));
        let config = test_config();

        provisioner.acquire(ServiceKind::Registry, &config).await.unwrap();
        provisioner.acquire(ServiceKind::DataStore, &config).await.unwrap();

        // Shutdown failures must not surface.
        provisioner.release_all().await;
        assert_eq!(provisioner.live_handles().await, 0);
        assert_eq!(launcher.shutdown_count(), 2);
    }

    #[tokio::test]
    async fn test_probe_is_polled_until_ready() {
        let mut probe = crate::services::MockReadinessProbe::new();
        let mut calls = 0_u32;
        probe.expect_check().times(3).returning(move |_, _| {
            calls += 1;
            calls >= 3
        });

        let provisioner =
            ServiceProvisioner::new(Arc::new(StaticLauncher::new()), Arc::new(probe));

        let handle = provisioner
            .acquire(ServiceKind::DataStore, &test_config())
            .await
            .unwrap();
        assert!(handle.is_ready());
    }

    #[tokio::test]
    async fn test_release_single_kind() {
        let provisioner = provisioner();
        let config = test_config();
        provisioner.acquire(ServiceKind::Registry, &config).await.unwrap();
        provisioner.acquire(ServiceKind::Cluster, &config).await.unwrap();

        provisioner.release(ServiceKind::Registry).await;
        assert_eq!(provisioner.live_handles().await, 1);
    }
}
