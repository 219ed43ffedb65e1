//! Ephemeral backing services and their lifecycle.
//!
//! Stages declare the service kinds they depend on; the
//! [`ServiceProvisioner`] starts each kind at most once per run, waits for
//! readiness, and tears everything down best-effort at run end.

mod provisioner;

pub use provisioner::ServiceProvisioner;

use crate::errors::InfrastructureError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The kinds of ephemeral services a stage can depend on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    /// A package registry the pipeline pushes images to.
    Registry,
    /// A deployment cluster workloads are applied to.
    Cluster,
    /// A data store backing the deployed application.
    DataStore,
}

impl ServiceKind {
    /// All service kinds, in provisioning order.
    pub const ALL: [Self; 3] = [Self::Registry, Self::Cluster, Self::DataStore];
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Registry => write!(f, "registry"),
            Self::Cluster => write!(f, "cluster"),
            Self::DataStore => write!(f, "data_store"),
        }
    }
}

/// A network address where a running service can be reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    url: String,
}

impl Endpoint {
    /// Creates an endpoint from a URL or host:port string.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    /// The address as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.url
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url)
    }
}

/// Readiness state of a provisioned service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Readiness {
    /// Launched, not yet confirmed reachable.
    Starting,
    /// The readiness probe has succeeded.
    Ready,
}

/// A live handle to a provisioned service.
///
/// At most one handle exists per kind per run; every stage declaring a
/// dependency on that kind receives the same handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceHandle {
    /// The service kind.
    pub kind: ServiceKind,
    /// Where the service can be reached.
    pub endpoint: Endpoint,
    /// Probe-confirmed readiness state.
    pub readiness: Readiness,
}

impl ServiceHandle {
    /// Creates a handle for a freshly launched, unprobed service.
    #[must_use]
    pub fn starting(kind: ServiceKind, endpoint: Endpoint) -> Self {
        Self {
            kind,
            endpoint,
            readiness: Readiness::Starting,
        }
    }

    /// Returns a copy of this handle marked ready.
    #[must_use]
    pub fn ready(mut self) -> Self {
        self.readiness = Readiness::Ready;
        self
    }

    /// Returns true if the readiness probe has succeeded.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.readiness == Readiness::Ready
    }
}

/// Starts and stops service instances.
///
/// This is the external boundary to whatever actually runs the services
/// (containers, processes, a test double). The provisioner owns *when*
/// instances start and stop; the launcher owns *how*.
#[async_trait]
pub trait ServiceLauncher: Send + Sync {
    /// Launches an instance of the given kind and returns its endpoint.
    async fn launch(&self, kind: ServiceKind) -> Result<Endpoint, InfrastructureError>;

    /// Stops the instance behind the handle. Failures are reported but the
    /// caller treats teardown as best-effort.
    async fn shutdown(&self, handle: &ServiceHandle) -> Result<(), InfrastructureError>;
}

/// Probes whether a launched service is ready to accept traffic.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReadinessProbe: Send + Sync {
    /// Returns true once the service behind the endpoint answers.
    async fn check(&self, kind: ServiceKind, endpoint: &Endpoint) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_kind_display() {
        assert_eq!(ServiceKind::Registry.to_string(), "registry");
        assert_eq!(ServiceKind::Cluster.to_string(), "cluster");
        assert_eq!(ServiceKind::DataStore.to_string(), "data_store");
    }

    #[test]
    fn test_endpoint_display() {
        let endpoint = Endpoint::new("registry:5000");
        assert_eq!(endpoint.as_str(), "registry:5000");
        assert_eq!(endpoint.to_string(), "registry:5000");
    }

    #[test]
    fn test_handle_readiness() {
        let handle = ServiceHandle::starting(ServiceKind::Cluster, Endpoint::new("k3s:6443"));
        assert!(!handle.is_ready());

        let ready = handle.ready();
        assert!(ready.is_ready());
        assert_eq!(ready.endpoint.as_str(), "k3s:6443");
    }

    #[test]
    fn test_service_kind_serialize() {
        let json = serde_json::to_string(&ServiceKind::DataStore).unwrap();
        assert_eq!(json, r#""data_store""#);
    }
}
