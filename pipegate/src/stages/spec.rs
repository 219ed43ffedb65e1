//! Stage specifications.

use super::Stage;
use crate::core::{ArtifactKind, GatePolicy};
use crate::errors::ConfigError;
use crate::services::ServiceKind;
use std::sync::Arc;

/// Specification for a single stage in a pipeline.
///
/// Immutable once the run starts: the runner reads the spec, the spec never
/// reads the runner.
#[derive(Debug, Clone)]
pub struct StageSpec {
    /// The unique name of the stage.
    pub name: String,
    /// The stage's declared enforcement policy.
    pub policy: GatePolicy,
    /// The stage implementation.
    pub runner: Arc<dyn Stage>,
    /// Service kinds this stage depends on, acquired before dispatch.
    pub services: Vec<ServiceKind>,
    /// Artifact kinds this stage consumes; must be produced earlier.
    pub needs: Vec<ArtifactKind>,
    /// Artifact kinds this stage produces.
    pub produces: Vec<ArtifactKind>,
}

impl StageSpec {
    /// Creates a new stage specification.
    #[must_use]
    pub fn new(name: impl Into<String>, policy: GatePolicy, runner: Arc<dyn Stage>) -> Self {
        Self {
            name: name.into(),
            policy,
            runner,
            services: Vec::new(),
            needs: Vec::new(),
            produces: Vec::new(),
        }
    }

    /// Declares a service dependency.
    #[must_use]
    pub fn with_service(mut self, kind: ServiceKind) -> Self {
        if !self.services.contains(&kind) {
            self.services.push(kind);
        }
        self
    }

    /// Declares a consumed artifact kind.
    #[must_use]
    pub fn with_need(mut self, kind: ArtifactKind) -> Self {
        if !self.needs.contains(&kind) {
            self.needs.push(kind);
        }
        self
    }

    /// Declares a produced artifact kind.
    #[must_use]
    pub fn produces(mut self, kind: ArtifactKind) -> Self {
        if !self.produces.contains(&kind) {
            self.produces.push(kind);
        }
        self
    }

    /// Validates the stage specification.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is empty or the stage both needs and
    /// produces the same artifact kind.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::new("stage name must not be empty").with_field("name"));
        }
        if let Some(kind) = self.needs.iter().find(|k| self.produces.contains(k)) {
            return Err(ConfigError::new(format!(
                "stage '{}' both needs and produces artifact kind '{kind}'",
                self.name
            ))
            .with_field(self.name.clone()));
        }
        Ok(())
    }
}
