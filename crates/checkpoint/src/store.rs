//! Status storage trait
//!
//! This module defines the StatusStore trait so the sync loop does not care
//! whether the status report goes to disk or nowhere.

use anyhow::Result;
use async_trait::async_trait;

use crate::StatusReport;

/// Trait for status report storage operations.
#[async_trait]
pub trait StatusStore: Send + Sync {
    /// Read the stored report.
    ///
    /// Returns None if nothing has been stored yet.
    async fn load(&self) -> Result<Option<StatusReport>>;

    /// Replace the stored report.
    async fn save(&self, report: &StatusReport) -> Result<()>;
}

/// Store used when status reporting is disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullStore;

#[async_trait]
impl StatusStore for NullStore {
    async fn load(&self) -> Result<Option<StatusReport>> {
        Ok(None)
    }

    async fn save(&self, _report: &StatusReport) -> Result<()> {
        Ok(())
    }
}
