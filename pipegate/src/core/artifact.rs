//! Artifacts threaded between stages.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// The kind of artifact a stage produces or consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// A built deployable package (e.g. a container image tarball).
    Package,
    /// A reference to a package pushed to a registry.
    ImageReference,
    /// A signed reference to the deployable artifact.
    SignedReference,
    /// A dependency manifest (software bill of materials).
    Sbom,
    /// A machine-readable findings document.
    FindingsDocument,
    /// A test report document.
    TestReport,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Package => write!(f, "package"),
            Self::ImageReference => write!(f, "image_reference"),
            Self::SignedReference => write!(f, "signed_reference"),
            Self::Sbom => write!(f, "sbom"),
            Self::FindingsDocument => write!(f, "findings_document"),
            Self::TestReport => write!(f, "test_report"),
        }
    }
}

/// An artifact produced by one stage and visible to later stages.
///
/// Artifacts are immutable once produced; the store rejects duplicate
/// `(kind, name)` pairs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunArtifact {
    /// What the artifact is.
    pub kind: ArtifactKind,

    /// Name unique within its kind (e.g. "search-api").
    pub name: String,

    /// An addressable reference (image ref, file name, document id).
    pub reference: String,

    /// Hex-encoded sha256 digest of the artifact content, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,

    /// The stage that produced the artifact. Filled in by the runner.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub produced_by: String,

    /// Optional structured payload (e.g. the SBOM document itself).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl RunArtifact {
    /// Creates a new artifact.
    #[must_use]
    pub fn new(
        kind: ArtifactKind,
        name: impl Into<String>,
        reference: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            name: name.into(),
            reference: reference.into(),
            digest: None,
            produced_by: String::new(),
            payload: None,
        }
    }

    /// Records the sha256 digest of the given content bytes.
    #[must_use]
    pub fn with_digest_of(mut self, content: &[u8]) -> Self {
        let digest = Sha256::digest(content);
        self.digest = Some(hex::encode(digest));
        self
    }

    /// Attaches a structured payload.
    #[must_use]
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Sets the producing stage.
    #[must_use]
    pub fn produced_by(mut self, stage: impl Into<String>) -> Self {
        self.produced_by = stage.into();
        self
    }

    /// The store key for this artifact.
    #[must_use]
    pub fn key(&self) -> (ArtifactKind, &str) {
        (self.kind, &self.name)
    }
}
