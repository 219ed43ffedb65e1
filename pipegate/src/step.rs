//! Immutable step specifications.
//!
//! A [`StepSpec`] describes everything the execution substrate needs to run
//! one tool invocation: image, arguments, environment, service bindings,
//! and secret references. It is built once via [`StepSpecBuilder`] and then
//! handed to a single `run_step` call, keeping each stage's inputs
//! declarative.

use crate::core::ArtifactKind;
use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// An immutable description of one tool invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepSpec {
    /// The tool image to run.
    pub image: String,

    /// The command and its arguments.
    pub args: Vec<String>,

    /// Environment variables.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,

    /// Working directory inside the step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workdir: Option<String>,

    /// Service bindings: alias name to endpoint address.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub bindings: BTreeMap<String, String>,

    /// Secrets exposed to the step: environment variable name to the
    /// config-level secret name. Values are resolved by the substrate,
    /// never embedded in the spec.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub secrets: BTreeMap<String, String>,

    /// Artifacts mounted into the step, by kind.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<ArtifactKind>,
}

impl StepSpec {
    /// Starts building a step for the given tool image.
    #[must_use]
    pub fn builder(image: impl Into<String>) -> StepSpecBuilder {
        StepSpecBuilder::new(image)
    }
}

/// Builder for [`StepSpec`].
#[derive(Debug, Clone, Default)]
pub struct StepSpecBuilder {
    image: String,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    workdir: Option<String>,
    bindings: BTreeMap<String, String>,
    secrets: BTreeMap<String, String>,
    inputs: Vec<ArtifactKind>,
}

impl StepSpecBuilder {
    /// Creates a builder for the given image.
    #[must_use]
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            ..Self::default()
        }
    }

    /// Appends one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets an environment variable.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Sets the working directory.
    #[must_use]
    pub fn workdir(mut self, dir: impl Into<String>) -> Self {
        self.workdir = Some(dir.into());
        self
    }

    /// Binds a service endpoint under an alias.
    #[must_use]
    pub fn binding(mut self, alias: impl Into<String>, endpoint: impl Into<String>) -> Self {
        self.bindings.insert(alias.into(), endpoint.into());
        self
    }

    /// Exposes a named secret through an environment variable.
    #[must_use]
    pub fn secret(mut self, env_var: impl Into<String>, secret_name: impl Into<String>) -> Self {
        self.secrets.insert(env_var.into(), secret_name.into());
        self
    }

    /// Mounts an artifact kind into the step.
    #[must_use]
    pub fn input(mut self, kind: ArtifactKind) -> Self {
        self.inputs.push(kind);
        self
    }

    /// Builds the immutable spec.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the image is empty or no arguments were
    /// provided.
    pub fn build(self) -> Result<StepSpec, ConfigError> {
        if self.image.trim().is_empty() {
            return Err(ConfigError::new("step image must not be empty").with_field("image"));
        }
        if self.args.is_empty() {
            return Err(ConfigError::new("step must have at least one argument").with_field("args"));
        }
        Ok(StepSpec {
            image: self.image,
            args: self.args,
            env: self.env,
            workdir: self.workdir,
            bindings: self.bindings,
            secrets: self.secrets,
            inputs: self.inputs,
        })
    }
}
