//! Pipeline builder with validation.

use crate::core::ArtifactKind;
use crate::errors::ConfigError;
use crate::stages::StageSpec;
use std::collections::HashSet;

/// A validated, ordered pipeline ready to run.
///
/// Stage order is total and fixed; the plan is immutable once built.
#[derive(Debug, Clone)]
pub struct PipelinePlan {
    name: String,
    stages: Vec<StageSpec>,
}

impl PipelinePlan {
    /// The pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The ordered stage list.
    #[must_use]
    pub fn stages(&self) -> &[StageSpec] {
        &self.stages
    }

    /// The number of stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }
}

/// Builder for creating validated pipelines.
#[derive(Debug, Default)]
pub struct PipelineBuilder {
    name: String,
    stages: Vec<StageSpec>,
}

impl PipelineBuilder {
    /// Creates a new pipeline builder.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: Vec::new(),
        }
    }

    /// Appends a stage.
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid spec, a duplicate stage name, or an
    /// artifact dependency no earlier stage produces.
    pub fn stage(mut self, spec: StageSpec) -> Result<Self, ConfigError> {
        spec.validate()?;

        if self.stages.iter().any(|s| s.name == spec.name) {
            return Err(
                ConfigError::new(format!("duplicate stage name '{}'", spec.name))
                    .with_field(spec.name.clone()),
            );
        }

        let produced_so_far: HashSet<ArtifactKind> = self
            .stages
            .iter()
            .flat_map(|s| s.produces.iter().copied())
            .collect();
        for need in &spec.needs {
            if !produced_so_far.contains(need) {
                return Err(ConfigError::new(format!(
                    "stage '{}' needs artifact kind '{need}' but no earlier stage produces it",
                    spec.name
                ))
                .with_field(spec.name.clone()));
            }
        }

        self.stages.push(spec);
        Ok(self)
    }

    /// Appends several stages.
    ///
    /// # Errors
    ///
    /// Returns the first validation error encountered.
    pub fn stages(
        mut self,
        specs: impl IntoIterator<Item = StageSpec>,
    ) -> Result<Self, ConfigError> {
        for spec in specs {
            self = self.stage(spec)?;
        }
        Ok(self)
    }

    /// The number of stages added so far.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Builds the pipeline.
    ///
    /// # Errors
    ///
    /// Returns an error if the builder has no stages or an empty name.
    pub fn build(self) -> Result<PipelinePlan, ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::new("pipeline name must not be empty").with_field("name"));
        }
        if self.stages.is_empty() {
            return Err(ConfigError::new("pipeline has no stages"));
        }
        Ok(PipelinePlan {
            name: self.name,
            stages: self.stages,
        })
    }
}
