//! The artifact store threading stage outputs forward.

use crate::core::{ArtifactKind, RunArtifact};
use thiserror::Error;

/// Error raised when a stage produces an artifact whose `(kind, name)` pair
/// already exists.
#[derive(Debug, Clone, Error)]
#[error("artifact conflict: {kind} '{name}' was already produced by stage '{producer}'")]
pub struct ArtifactConflictError {
    /// The conflicting kind.
    pub kind: ArtifactKind,
    /// The conflicting name.
    pub name: String,
    /// The stage that produced the existing artifact.
    pub producer: String,
}

/// Append-only store of artifacts produced during one run.
///
/// Only the runner inserts; stages receive a shared reference and read.
/// Insertion order is preserved so exports appear in stage-execution order.
#[derive(Debug, Default)]
pub struct ArtifactStore {
    artifacts: Vec<RunArtifact>,
}

impl ArtifactStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an artifact.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactConflictError`] if an artifact with the same
    /// `(kind, name)` pair already exists.
    pub fn insert(&mut self, artifact: RunArtifact) -> Result<(), ArtifactConflictError> {
        if let Some(existing) = self
            .artifacts
            .iter()
            .find(|a| a.key() == artifact.key())
        {
            return Err(ArtifactConflictError {
                kind: artifact.kind,
                name: artifact.name.clone(),
                producer: existing.produced_by.clone(),
            });
        }
        self.artifacts.push(artifact);
        Ok(())
    }

    /// Looks up an artifact by kind and name.
    #[must_use]
    pub fn get(&self, kind: ArtifactKind, name: &str) -> Option<&RunArtifact> {
        self.artifacts
            .iter()
            .find(|a| a.kind == kind && a.name == name)
    }

    /// Returns the most recently produced artifact of the given kind.
    #[must_use]
    pub fn latest(&self, kind: ArtifactKind) -> Option<&RunArtifact> {
        self.artifacts.iter().rev().find(|a| a.kind == kind)
    }

    /// Returns all artifacts of the given kind, in production order.
    #[must_use]
    pub fn all_of(&self, kind: ArtifactKind) -> Vec<&RunArtifact> {
        self.artifacts.iter().filter(|a| a.kind == kind).collect()
    }

    /// Returns every artifact, in production order.
    #[must_use]
    pub fn all(&self) -> &[RunArtifact] {
        &self.artifacts
    }

    /// Returns true if at least one artifact of the given kind exists.
    #[must_use]
    pub fn contains(&self, kind: ArtifactKind) -> bool {
        self.artifacts.iter().any(|a| a.kind == kind)
    }

    /// The number of stored artifacts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    /// Returns true if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }
}
