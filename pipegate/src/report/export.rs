//! Report export to persisted documents.
//!
//! Writes the structured findings documents (one per dispatched stage),
//! the dependency manifest, and the signed reference, in stage-execution
//! order, plus the report itself.

use super::Report;
use crate::context::ArtifactStore;
use crate::core::ArtifactKind;
use crate::errors::ReportError;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Writes a run's documents into a target directory.
#[derive(Debug, Clone)]
pub struct ReportExporter {
    dir: PathBuf,
}

impl ReportExporter {
    /// Creates an exporter targeting the given directory.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Exports the report and its associated artifacts.
    ///
    /// Returns the written paths, in write order.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError`] on serialization or I/O failure.
    pub fn export(
        &self,
        report: &Report,
        artifacts: &ArtifactStore,
    ) -> Result<Vec<PathBuf>, ReportError> {
        fs::create_dir_all(&self.dir)?;
        let mut written = Vec::new();

        // Findings documents, one per dispatched stage, in dispatch order.
        for (index, entry) in report.entries.iter().enumerate() {
            if !entry.status.was_dispatched() {
                continue;
            }
            let path = self.dir.join(format!("{index:02}-{}.findings.json", entry.stage));
            self.write_json(&path, entry)?;
            written.push(path);
        }

        if let Some(sbom) = artifacts.latest(ArtifactKind::Sbom) {
            let path = self.dir.join("dependency-manifest.json");
            self.write_json(&path, sbom)?;
            written.push(path);
        }

        if let Some(signed) = artifacts.latest(ArtifactKind::SignedReference) {
            let path = self.dir.join("signed-reference.json");
            self.write_json(&path, signed)?;
            written.push(path);
        }

        let path = self.dir.join("report.json");
        self.write_json(&path, report)?;
        written.push(path);

        info!(dir = %self.dir.display(), documents = written.len(), "report exported");
        Ok(written)
    }

    fn write_json<T: serde::Serialize>(&self, path: &Path, value: &T) -> Result<(), ReportError> {
        let body = serde_json::to_vec_pretty(value)?;
        fs::write(path, body)?;
        Ok(())
    }
}
