//! The per-run execution context.

use super::RunIdentity;
use crate::config::RunConfig;
use crate::events::{EventSink, NoOpEventSink};
use crate::services::{Endpoint, ServiceKind};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// The context constructed once per run and passed by reference to every
/// stage and to the provisioner.
///
/// Replaces any notion of process-global client state: two `RunContext`
/// values never share anything, so independent concurrent runs are safe.
pub struct RunContext {
    identity: RunIdentity,
    config: RunConfig,
    endpoints: RwLock<HashMap<ServiceKind, Endpoint>>,
    event_sink: Arc<dyn EventSink>,
}

impl RunContext {
    /// Creates a new run context.
    #[must_use]
    pub fn new(identity: RunIdentity, config: RunConfig) -> Self {
        Self {
            identity,
            config,
            endpoints: RwLock::new(HashMap::new()),
            event_sink: Arc::new(NoOpEventSink),
        }
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Returns the run identity.
    #[must_use]
    pub fn identity(&self) -> &RunIdentity {
        &self.identity
    }

    /// Returns the run ID.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.identity.run_id
    }

    /// Returns the run configuration.
    #[must_use]
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Records a bound service endpoint, making it visible to stages.
    pub fn record_endpoint(&self, kind: ServiceKind, endpoint: Endpoint) {
        self.endpoints.write().insert(kind, endpoint);
    }

    /// Looks up the endpoint bound for a service kind.
    #[must_use]
    pub fn endpoint(&self, kind: ServiceKind) -> Option<Endpoint> {
        self.endpoints.read().get(&kind).cloned()
    }

    /// Returns the event sink.
    #[must_use]
    pub fn event_sink(&self) -> &Arc<dyn EventSink> {
        &self.event_sink
    }

    /// Emits an observability event; never fails.
    pub fn try_emit_event(&self, event_type: &str, data: Option<serde_json::Value>) {
        self.event_sink.try_emit(event_type, data);
    }
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("run_id", &self.identity.run_id)
            .field("pipeline", &self.config.pipeline)
            .field("endpoints", &*self.endpoints.read())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::CollectingEventSink;

    fn test_ctx() -> RunContext {
        RunContext::new(RunIdentity::new(), RunConfig::new("search-api"))
    }

    #[test]
    fn test_context_exposes_config() {
        let ctx = test_ctx();
        assert_eq!(ctx.config().target, "search-api");
    }

    #[test]
    fn test_endpoint_recording() {
        let ctx = test_ctx();
        assert!(ctx.endpoint(ServiceKind::Registry).is_none());

        ctx.record_endpoint(ServiceKind::Registry, Endpoint::new("registry:5000"));
        assert_eq!(
            ctx.endpoint(ServiceKind::Registry).unwrap().as_str(),
            "registry:5000"
        );
        assert!(ctx.endpoint(ServiceKind::Cluster).is_none());
    }

    #[test]
    fn test_event_emission() {
        let sink = Arc::new(CollectingEventSink::new());
        let ctx = test_ctx().with_event_sink(sink.clone());

        ctx.try_emit_event("run.started", None);
        assert_eq!(sink.count("run.started"), 1);
    }

    #[test]
    fn test_contexts_are_independent() {
        let a = test_ctx();
        let b = test_ctx();

        a.record_endpoint(ServiceKind::Cluster, Endpoint::new("k3s:6443"));
        assert!(b.endpoint(ServiceKind::Cluster).is_none());
        assert_ne!(a.run_id(), b.run_id());
    }
}
