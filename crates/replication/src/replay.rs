//! Replay of a decoded packet against a [`ReplicationTarget`].

use std::collections::HashMap;

use checkpoint::SyncPosition;
use mbmirror_dump::Fields;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::error::{ReplicationError, Result};
use crate::hook::ReplicationHook;
use crate::mutation::{InsertConflict, Mutation};
use crate::names::{NameResolver, Resolution, TableName};
use crate::pending::{OpKind, PendingOperation, ReplicationPacket};
use crate::stats::ReplayStats;
use crate::target::ReplicationTarget;

/// What happens when a single mutation fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Durability {
    /// Undo just that mutation, log it and keep going.
    #[default]
    BestEffort,
    /// Roll back the whole packet and stop.
    Strict,
}

impl std::str::FromStr for Durability {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "best-effort" => Ok(Durability::BestEffort),
            "strict" => Ok(Durability::Strict),
            other => anyhow::bail!("Unknown durability mode: {other}"),
        }
    }
}

/// Applies reconstructed transactions in upstream order.
#[derive(Debug, Clone, Default)]
pub struct ReplayEngine {
    resolver: NameResolver,
    durability: Durability,
    on_insert_conflict: InsertConflict,
}

impl ReplayEngine {
    pub fn new(resolver: NameResolver) -> Self {
        Self {
            resolver,
            ..Default::default()
        }
    }

    pub fn with_durability(mut self, durability: Durability) -> Self {
        self.durability = durability;
        self
    }

    pub fn with_insert_conflict(mut self, policy: InsertConflict) -> Self {
        self.on_insert_conflict = policy;
        self
    }

    pub fn durability(&self) -> Durability {
        self.durability
    }

    /// Replay `packet` on top of `current`.
    ///
    /// The packet's schema sequence is checked before anything is touched.
    /// All operations, the position write-back and the commit happen in a
    /// single transaction; any error rolls it back.
    pub async fn process<T, H>(
        &self,
        packet: &ReplicationPacket,
        current: &SyncPosition,
        target: &mut T,
        hooks: &mut H,
    ) -> Result<ReplayStats>
    where
        T: ReplicationTarget + ?Sized,
        H: ReplicationHook + ?Sized,
    {
        let schema_sequence =
            packet
                .schema_sequence
                .ok_or(ReplicationError::MissingSchemaSequence {
                    sequence: packet.sequence,
                })?;
        if schema_sequence != current.schema_seq {
            return Err(ReplicationError::SchemaMismatch {
                expected: current.schema_seq,
                found: schema_sequence,
            });
        }

        if let Some(timestamp) = &packet.timestamp {
            info!(
                "Replaying packet {} (schema {schema_sequence}, produced {timestamp})",
                packet.sequence
            );
        }

        hooks
            .begin(packet.sequence)
            .await
            .map_err(|source| hook_error("begin", source))?;

        target.begin().await?;
        let next = SyncPosition::new(schema_sequence, packet.sequence);
        match self.replay_and_commit(packet, next, target, hooks).await {
            Ok(stats) => {
                for (table, table_stats) in stats.iter() {
                    info!("{table}: {table_stats}");
                }
                if stats.failed() > 0 {
                    warn!(
                        "Packet {} committed with {} failed mutations",
                        packet.sequence,
                        stats.failed()
                    );
                }
                hooks
                    .after_commit()
                    .await
                    .map_err(|source| hook_error("after_commit", source))?;
                Ok(stats)
            }
            Err(e) => {
                if let Err(rollback_err) = target.rollback().await {
                    error!("Rollback of packet {} failed: {rollback_err:#}", packet.sequence);
                }
                Err(e)
            }
        }
    }

    async fn replay_and_commit<T, H>(
        &self,
        packet: &ReplicationPacket,
        next: SyncPosition,
        target: &mut T,
        hooks: &mut H,
    ) -> Result<ReplayStats>
    where
        T: ReplicationTarget + ?Sized,
        H: ReplicationHook + ?Sized,
    {
        let mut stats = ReplayStats::new();
        let mut known_tables: HashMap<TableName, bool> = HashMap::new();

        for transaction in packet.pending.transactions() {
            debug!(
                "Transaction {} ({} operations)",
                transaction.xid,
                transaction.operations.len()
            );
            for op in &transaction.operations {
                let table = match self.resolver.resolve(&op.table_ref) {
                    Resolution::Table(table) => table,
                    Resolution::Ignored(_) => continue,
                };

                let exists = match known_tables.get(&table) {
                    Some(exists) => *exists,
                    None => {
                        let exists = target.has_table(&table).await?;
                        if !exists {
                            warn!("Skipping changes to missing table {table}");
                        }
                        known_tables.insert(table.clone(), exists);
                        exists
                    }
                };
                if !exists {
                    continue;
                }

                self.replay_operation(packet, op, table, target, hooks, &mut stats)
                    .await?;
            }
        }

        target.write_position(next).await?;
        hooks
            .before_commit()
            .await
            .map_err(|source| hook_error("before_commit", source))?;
        target.commit().await?;
        Ok(stats)
    }

    async fn replay_operation<T, H>(
        &self,
        packet: &ReplicationPacket,
        op: &PendingOperation,
        table: TableName,
        target: &mut T,
        hooks: &mut H,
        stats: &mut ReplayStats,
    ) -> Result<()>
    where
        T: ReplicationTarget + ?Sized,
        H: ReplicationHook + ?Sized,
    {
        let keys = packet.pending.keys(op.row_id);
        let values = packet.pending.values(op.row_id);

        let mutation = match Mutation::build(
            op.kind,
            table.clone(),
            &keys,
            &values,
            self.on_insert_conflict,
        ) {
            Ok(Some(mutation)) => mutation,
            Ok(None) => {
                debug!("Row {} on {table}: update without values", op.row_id);
                return Ok(());
            }
            Err(e) => {
                // No usable pending data for this row: nothing safe to execute.
                warn!("Skipping row {} on {table}: {e}", op.row_id);
                return Ok(());
            }
        };

        call_before(hooks, op.kind, &table, &keys, &values).await?;

        if self.durability == Durability::BestEffort {
            target.savepoint().await?;
        }

        match target.apply(&mutation).await {
            Ok(_) => {
                if self.durability == Durability::BestEffort {
                    target.release_savepoint().await?;
                }
                call_after(hooks, op.kind, &table, &keys, &values).await?;
                stats.record(&table, op.kind);
                Ok(())
            }
            Err(source) => {
                if self.durability == Durability::BestEffort {
                    target.rollback_to_savepoint().await?;
                }
                let statement = target.describe(&mutation).to_string();
                self.mutation_failed(&table, statement, source, stats)
            }
        }
    }

    fn mutation_failed(
        &self,
        table: &TableName,
        statement: String,
        source: anyhow::Error,
        stats: &mut ReplayStats,
    ) -> Result<()> {
        match self.durability {
            Durability::Strict => Err(ReplicationError::Mutation { statement, source }),
            Durability::BestEffort => {
                error!("Mutation failed: {statement}: {source:#}");
                stats.record_failure(table);
                Ok(())
            }
        }
    }
}

fn hook_error(callback: &'static str, source: anyhow::Error) -> ReplicationError {
    ReplicationError::Hook { callback, source }
}

async fn call_before<H: ReplicationHook + ?Sized>(
    hooks: &mut H,
    kind: OpKind,
    table: &TableName,
    keys: &Fields,
    values: &Fields,
) -> Result<()> {
    match kind {
        OpKind::Insert => hooks
            .before_insert(table, values)
            .await
            .map_err(|source| hook_error("before_insert", source)),
        OpKind::Update => hooks
            .before_update(table, keys, values)
            .await
            .map_err(|source| hook_error("before_update", source)),
        OpKind::Delete => hooks
            .before_delete(table, keys)
            .await
            .map_err(|source| hook_error("before_delete", source)),
    }
}

async fn call_after<H: ReplicationHook + ?Sized>(
    hooks: &mut H,
    kind: OpKind,
    table: &TableName,
    keys: &Fields,
    values: &Fields,
) -> Result<()> {
    match kind {
        OpKind::Insert => hooks
            .after_insert(table, values)
            .await
            .map_err(|source| hook_error("after_insert", source)),
        OpKind::Update => hooks
            .after_update(table, keys, values)
            .await
            .map_err(|source| hook_error("after_update", source)),
        OpKind::Delete => hooks
            .after_delete(table, keys)
            .await
            .map_err(|source| hook_error("after_delete", source)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_durability_parse() {
        assert_eq!("strict".parse::<Durability>().unwrap(), Durability::Strict);
        assert_eq!(
            "best-effort".parse::<Durability>().unwrap(),
            Durability::BestEffort
        );
        assert!("lenient".parse::<Durability>().is_err());
        assert_eq!(Durability::default(), Durability::BestEffort);
    }
}
