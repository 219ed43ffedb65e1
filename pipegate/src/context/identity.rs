//! Run identity for tracking pipeline executions.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifies one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunIdentity {
    /// The unique ID for this run.
    pub run_id: Uuid,

    /// Who or what triggered the run (operator, CI trigger).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub triggered_by: Option<String>,

    /// The source revision being built, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
}

impl Default for RunIdentity {
    fn default() -> Self {
        Self::new()
    }
}

impl RunIdentity {
    /// Creates a new identity with a generated run ID.
    #[must_use]
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            triggered_by: None,
            revision: None,
        }
    }

    /// Creates an identity with a specific run ID.
    #[must_use]
    pub fn with_run_id(run_id: Uuid) -> Self {
        Self {
            run_id,
            triggered_by: None,
            revision: None,
        }
    }

    /// Sets the trigger.
    #[must_use]
    pub fn triggered_by(mut self, trigger: impl Into<String>) -> Self {
        self.triggered_by = Some(trigger.into());
        self
    }

    /// Sets the source revision.
    #[must_use]
    pub fn at_revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = Some(revision.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_new_generates_id() {
        let a = RunIdentity::new();
        let b = RunIdentity::new();
        assert_ne!(a.run_id, b.run_id);
        assert!(a.triggered_by.is_none());
    }

    #[test]
    fn test_identity_builder() {
        let identity = RunIdentity::new()
            .triggered_by("ci")
            .at_revision("3f2a9c1");

        assert_eq!(identity.triggered_by.as_deref(), Some("ci"));
        assert_eq!(identity.revision.as_deref(), Some("3f2a9c1"));
    }

    #[test]
    fn test_identity_serialization() {
        let identity = RunIdentity::new().triggered_by("operator");
        let json = serde_json::to_string(&identity).unwrap();
        let deserialized: RunIdentity = serde_json::from_str(&json).unwrap();

        assert_eq!(identity.run_id, deserialized.run_id);
        assert_eq!(identity.triggered_by, deserialized.triggered_by);
    }
}
