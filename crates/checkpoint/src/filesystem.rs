//! Filesystem-based status storage implementation.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::store::StatusStore;
use crate::StatusReport;

/// Filesystem implementation of StatusStore trait.
///
/// Stores the report as a single JSON file. Writes go to a temporary file
/// in the same directory which is then renamed over the target, so readers
/// never observe a half-written report.
pub struct FilesystemStore {
    path: PathBuf,
}

impl FilesystemStore {
    /// Create a new FilesystemStore writing to the given file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Get the file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl StatusStore for FilesystemStore {
    async fn load(&self) -> Result<Option<StatusReport>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read status file {}", self.path.display()))?;
        let report = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse status file {}", self.path.display()))?;
        Ok(Some(report))
    }

    async fn save(&self, report: &StatusReport) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        tmp.write_all(serde_json::to_string_pretty(report)?.as_bytes())?;
        tmp.flush()?;
        tmp.persist(&self.path)
            .with_context(|| format!("Failed to replace status file {}", self.path.display()))?;

        tracing::debug!(
            "Saved status to {}: schema {}, replication {}",
            self.path.display(),
            report.schema_seq,
            report.replication_seq
        );
        Ok(())
    }
}
