//! Error taxonomy for pipeline runs.
//!
//! The taxonomy separates errors by *when* they can occur and *how* they
//! escalate:
//!
//! - [`ConfigError`] surfaces before the run starts; the run never enters
//!   `Running`.
//! - [`StageExecutionError`] means the operation ran and reported findings
//!   or a failure; severity follows the stage's declared policy.
//! - [`InfrastructureError`] means the operation could not run at all;
//!   always treated as hard, regardless of the stage's policy.
//! - [`ServiceUnavailable`] means a backing service missed its readiness
//!   deadline; always hard.

use crate::services::ServiceKind;
use thiserror::Error;

/// The top-level error type for pipeline operations.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Invalid or missing required input; the run never starts.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// A stage ran and reported a failure or finding.
    #[error("{0}")]
    StageExecution(#[from] StageExecutionError),

    /// A stage (or the substrate beneath it) could not run at all.
    #[error("{0}")]
    Infrastructure(#[from] InfrastructureError),

    /// A backing service failed to become ready within its deadline.
    #[error("{0}")]
    ServiceUnavailable(#[from] ServiceUnavailable),

    /// Report export failed.
    #[error("{0}")]
    Report(#[from] ReportError),
}

impl PipelineError {
    /// Returns true if this error always aborts the run, regardless of the
    /// stage's declared policy.
    #[must_use]
    pub fn is_always_hard(&self) -> bool {
        matches!(self, Self::Infrastructure(_) | Self::ServiceUnavailable(_))
    }
}

/// Error raised when run configuration is invalid or incomplete.
#[derive(Debug, Clone, Error)]
#[error("configuration error: {message}")]
pub struct ConfigError {
    /// What is wrong.
    pub message: String,
    /// The offending field or stage name, when known.
    pub field: Option<String>,
}

impl ConfigError {
    /// Creates a new configuration error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            field: None,
        }
    }

    /// Attaches the offending field name.
    #[must_use]
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }
}

/// Error raised when a stage ran and reported a failure or finding.
///
/// The gate enforcer maps this onto the stage's declared policy; it never
/// escalates on its own.
#[derive(Debug, Clone, Error)]
#[error("stage '{stage}' reported: {message}")]
pub struct StageExecutionError {
    /// The reporting stage.
    pub stage: String,
    /// The failure or finding summary.
    pub message: String,
}

impl StageExecutionError {
    /// Creates a new stage execution error.
    #[must_use]
    pub fn new(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            message: message.into(),
        }
    }
}

/// Error raised when an operation could not be dispatched or crashed before
/// producing a result.
#[derive(Debug, Clone, Error)]
#[error("infrastructure error{}: {message}", .stage.as_ref().map(|s| format!(" in stage '{s}'")).unwrap_or_default())]
pub struct InfrastructureError {
    /// The stage being dispatched, when the failure is attributable to one.
    pub stage: Option<String>,
    /// What went wrong.
    pub message: String,
}

impl InfrastructureError {
    /// Creates a new infrastructure error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            stage: None,
            message: message.into(),
        }
    }

    /// Attributes the error to a stage.
    #[must_use]
    pub fn in_stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = Some(stage.into());
        self
    }
}

// A step that cannot even be composed (missing artifact, unusable spec)
// cannot run; dispatch-level classification applies.
impl From<ConfigError> for InfrastructureError {
    fn from(err: ConfigError) -> Self {
        Self::new(err.to_string())
    }
}

/// Error raised when a backing service misses its readiness deadline.
#[derive(Debug, Clone, Error)]
#[error("service '{kind}' failed to become ready within {waited_secs:.0}s")]
pub struct ServiceUnavailable {
    /// The service kind that never became ready.
    pub kind: ServiceKind,
    /// How long the provisioner waited before giving up.
    pub waited_secs: f64,
}

impl ServiceUnavailable {
    /// Creates a new service-unavailable error.
    #[must_use]
    pub fn new(kind: ServiceKind, waited_secs: f64) -> Self {
        Self { kind, waited_secs }
    }
}

/// Errors from report handling and export.
#[derive(Debug, Error)]
pub enum ReportError {
    /// Writing an export document failed.
    #[error("report export failed: {0}")]
    Export(#[from] std::io::Error),

    /// Serializing an export document failed.
    #[error("report serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::new("target must not be empty").with_field("target");
        assert_eq!(
            err.to_string(),
            "configuration error: target must not be empty"
        );
        assert_eq!(err.field.as_deref(), Some("target"));
    }

    #[test]
    fn test_infrastructure_error_display() {
        let err = InfrastructureError::new("substrate unreachable").in_stage("build");
        assert_eq!(
            err.to_string(),
            "infrastructure error in stage 'build': substrate unreachable"
        );

        let bare = InfrastructureError::new("substrate unreachable");
        assert_eq!(
            bare.to_string(),
            "infrastructure error: substrate unreachable"
        );
    }

    #[test]
    fn test_service_unavailable_display() {
        let err = ServiceUnavailable::new(ServiceKind::Cluster, 60.0);
        assert_eq!(
            err.to_string(),
            "service 'cluster' failed to become ready within 60s"
        );
    }

    #[test]
    fn test_always_hard_classification() {
        let infra: PipelineError = InfrastructureError::new("crashed").into();
        let service: PipelineError = ServiceUnavailable::new(ServiceKind::Registry, 30.0).into();
        let stage: PipelineError = StageExecutionError::new("sast-scan", "2 findings").into();

        assert!(infra.is_always_hard());
        assert!(service.is_always_hard());
        assert!(!stage.is_always_hard());
    }

    #[test]
    fn test_stage_execution_error_display() {
        let err = StageExecutionError::new("dependency-scan", "vulnerable packages found");
        assert_eq!(
            err.to_string(),
            "stage 'dependency-scan' reported: vulnerable packages found"
        );
    }
}
