//! Run configuration.
//!
//! A [`RunConfig`] describes one pipeline invocation: which profile of the
//! canonical stage list is active, the enforcement thresholds for the
//! scanning stages, target identifiers, credentials, and service readiness
//! deadlines. Differences between "quick" and "full" runs are expressed
//! here, not as separate pipeline definitions.

use crate::errors::ConfigError;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Which subset of the canonical stage list a run executes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunProfile {
    /// The pre-deploy subset: scans, build, package, image checks.
    Quick,
    /// Every stage, including deploy and the post-deploy test battery.
    Full,
    /// An explicit stage subset, validated against the catalog.
    Custom(Vec<String>),
}

impl Default for RunProfile {
    fn default() -> Self {
        Self::Full
    }
}

/// Minimum severity a scanner enforces.
///
/// Scanners report everything at or above this level; the stage's policy
/// decides what happens to the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeverityThreshold {
    /// Report all findings.
    Low,
    /// Medium and above.
    Medium,
    /// High and critical only.
    High,
    /// Critical only.
    Critical,
}

impl Default for SeverityThreshold {
    fn default() -> Self {
        Self::High
    }
}

impl SeverityThreshold {
    /// The tool-facing severity list for this threshold, e.g.
    /// `"HIGH,CRITICAL"`.
    #[must_use]
    pub fn tool_arg(&self) -> &'static str {
        match self {
            Self::Low => "LOW,MEDIUM,HIGH,CRITICAL",
            Self::Medium => "MEDIUM,HIGH,CRITICAL",
            Self::High => "HIGH,CRITICAL",
            Self::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for SeverityThreshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// A secret configuration value.
///
/// The wrapper keeps key material out of `Debug` output and log lines;
/// steps reference secrets by name and only the substrate sees the value.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretValue(String);

impl SecretValue {
    /// Wraps an already-plaintext secret.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Decodes base64-encoded secret material (the usual transport for
    /// signing keys).
    pub fn from_base64(encoded: &str) -> Result<Self, ConfigError> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| ConfigError::new(format!("invalid base64 secret: {e}")))?;
        let value = String::from_utf8(bytes)
            .map_err(|_| ConfigError::new("secret material is not valid UTF-8"))?;
        Ok(Self(value))
    }

    /// Exposes the secret value.
    #[must_use]
    pub fn reveal(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretValue(***)")
    }
}

/// Configuration for one pipeline run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// The pipeline name, used in reports and logs.
    pub pipeline: String,
    /// Which stages are active.
    pub profile: RunProfile,
    /// The deployable's identifier (image name).
    pub target: String,
    /// The image tag.
    pub tag: String,
    /// Minimum severity the scanning stages enforce.
    pub severity: SeverityThreshold,
    /// Minimum test coverage percentage (0-100).
    pub min_coverage: u8,
    /// Minimum mutation score percentage (0-100).
    pub min_mutation_score: u8,
    /// Virtual users for the load-test stage.
    pub perf_virtual_users: u32,
    /// Duration argument for the load-test stage (e.g. "30s").
    pub perf_duration: String,
    /// Signing key for the sign stage; required when that stage is active.
    pub signing_key: Option<SecretValue>,
    /// Password for the signing key.
    pub signing_password: Option<SecretValue>,
    /// External registry to publish to after all gates pass; the publish
    /// stage only joins the run when all three values are present.
    pub registry_url: Option<String>,
    /// External registry username.
    pub registry_username: Option<SecretValue>,
    /// External registry password or token.
    pub registry_password: Option<SecretValue>,
    /// How long a service may take to become ready.
    pub readiness_deadline: Duration,
    /// How often the readiness probe is retried.
    pub readiness_poll_interval: Duration,
}

impl RunConfig {
    /// Creates a configuration for the given target with defaults matching
    /// a full enforced run.
    #[must_use]
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            pipeline: "security-pipeline".to_string(),
            profile: RunProfile::Full,
            target: target.into(),
            tag: "latest".to_string(),
            severity: SeverityThreshold::High,
            min_coverage: 80,
            min_mutation_score: 80,
            perf_virtual_users: 10,
            perf_duration: "30s".to_string(),
            signing_key: None,
            signing_password: None,
            registry_url: None,
            registry_username: None,
            registry_password: None,
            readiness_deadline: Duration::from_secs(60),
            readiness_poll_interval: Duration::from_millis(500),
        }
    }

    /// Sets the pipeline name.
    #[must_use]
    pub fn with_pipeline(mut self, name: impl Into<String>) -> Self {
        self.pipeline = name.into();
        self
    }

    /// Sets the run profile.
    #[must_use]
    pub fn with_profile(mut self, profile: RunProfile) -> Self {
        self.profile = profile;
        self
    }

    /// Sets the image tag.
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }

    /// Sets the enforced severity threshold.
    #[must_use]
    pub fn with_severity(mut self, severity: SeverityThreshold) -> Self {
        self.severity = severity;
        self
    }

    /// Sets the signing key and password.
    #[must_use]
    pub fn with_signing_key(mut self, key: SecretValue, password: SecretValue) -> Self {
        self.signing_key = Some(key);
        self.signing_password = Some(password);
        self
    }

    /// Sets external registry credentials, enabling the publish stage.
    #[must_use]
    pub fn with_registry(
        mut self,
        url: impl Into<String>,
        username: SecretValue,
        password: SecretValue,
    ) -> Self {
        self.registry_url = Some(url.into());
        self.registry_username = Some(username);
        self.registry_password = Some(password);
        self
    }

    /// Sets the service readiness deadline.
    #[must_use]
    pub fn with_readiness_deadline(mut self, deadline: Duration) -> Self {
        self.readiness_deadline = deadline;
        self
    }

    /// Sets the readiness poll interval.
    #[must_use]
    pub fn with_readiness_poll_interval(mut self, interval: Duration) -> Self {
        self.readiness_poll_interval = interval;
        self
    }

    /// The full image reference for a registry endpoint, e.g.
    /// `registry:5000/search-api:latest`.
    #[must_use]
    pub fn image_ref(&self, registry: &str) -> String {
        format!("{registry}/{}:{}", self.target, self.tag)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for empty identifiers, out-of-range
    /// thresholds, or an empty custom profile. Stage-name validation
    /// against the catalog happens at pipeline resolution.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pipeline.trim().is_empty() {
            return Err(ConfigError::new("pipeline name must not be empty").with_field("pipeline"));
        }
        if self.target.trim().is_empty() {
            return Err(ConfigError::new("target must not be empty").with_field("target"));
        }
        if self.tag.trim().is_empty() {
            return Err(ConfigError::new("tag must not be empty").with_field("tag"));
        }
        if self.min_coverage > 100 {
            return Err(
                ConfigError::new("min_coverage must be between 0 and 100").with_field("min_coverage")
            );
        }
        if self.min_mutation_score > 100 {
            return Err(ConfigError::new("min_mutation_score must be between 0 and 100")
                .with_field("min_mutation_score"));
        }
        if let RunProfile::Custom(stages) = &self.profile {
            if stages.is_empty() {
                return Err(
                    ConfigError::new("custom profile must name at least one stage")
                        .with_field("profile"),
                );
            }
        }
        if self.readiness_deadline.is_zero() {
            return Err(ConfigError::new("readiness deadline must be non-zero")
                .with_field("readiness_deadline"));
        }
        Ok(())
    }
}
