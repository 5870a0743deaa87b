//! Destination database seen by the replay engine.

use anyhow::Result;
use async_trait::async_trait;
use checkpoint::SyncPosition;

use crate::mutation::{GenericDialect, Mutation, Statement};
use crate::names::TableName;

/// A transactional destination for replayed mutations.
///
/// The engine opens exactly one transaction per packet. Savepoints are only
/// used in best-effort mode, around each mutation.
#[async_trait]
pub trait ReplicationTarget: Send {
    /// The `(schema, replication)` position the database was last synced to.
    async fn read_position(&mut self) -> Result<SyncPosition>;

    async fn begin(&mut self) -> Result<()>;

    /// Whether the destination table exists.
    async fn has_table(&mut self, table: &TableName) -> Result<bool>;

    /// Execute a mutation, returning the number of affected rows.
    async fn apply(&mut self, mutation: &Mutation) -> Result<u64>;

    async fn savepoint(&mut self) -> Result<()>;

    async fn release_savepoint(&mut self) -> Result<()>;

    async fn rollback_to_savepoint(&mut self) -> Result<()>;

    /// Record the new position inside the open transaction.
    async fn write_position(&mut self, position: SyncPosition) -> Result<()>;

    async fn commit(&mut self) -> Result<()>;

    async fn rollback(&mut self) -> Result<()>;

    /// The statement `apply` would run, for error reports.
    fn describe(&self, mutation: &Mutation) -> Statement {
        mutation.render(&GenericDialect)
    }
}
