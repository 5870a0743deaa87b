//! [`ReplicationTarget`] over a tokio-postgres connection.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use checkpoint::SyncPosition;
use mbmirror_replication::{Mutation, ReplicationTarget, Statement, TableName};
use tokio_postgres::types::ToSql;
use tracing::debug;

use crate::catalog::ColumnCatalog;
use crate::client::SharedClient;
use crate::dialect::{quote_qualified, PostgresDialect};

/// Table holding the replication watermark.
pub const DEFAULT_CONTROL_TABLE: &str = "replication_control";

const SAVEPOINT: &str = "mbmirror_mutation";

/// Replays mutations on PostgreSQL.
///
/// Transactions are driven with plain `BEGIN`/`COMMIT` on the shared client,
/// so hook lookups issued on the same client run inside the packet's
/// transaction and observe its changes.
pub struct PostgresTarget {
    client: SharedClient,
    control_table: String,
    catalog: ColumnCatalog,
}

impl PostgresTarget {
    pub fn new(client: SharedClient, control_table: impl Into<String>) -> Self {
        Self {
            client,
            control_table: control_table.into(),
            catalog: ColumnCatalog::new(),
        }
    }

    pub fn client(&self) -> SharedClient {
        self.client.clone()
    }

    async fn batch(&self, sql: &str) -> Result<()> {
        let client = self.client.lock().await;
        client
            .batch_execute(sql)
            .await
            .with_context(|| format!("Failed to execute {sql}"))
    }
}

#[async_trait]
impl ReplicationTarget for PostgresTarget {
    async fn read_position(&mut self) -> Result<SyncPosition> {
        let sql = format!(
            "SELECT current_schema_sequence::bigint, current_replication_sequence::bigint FROM {}",
            quote_qualified(&self.control_table)
        );
        let client = self.client.lock().await;
        let rows = client
            .query(&sql, &[])
            .await
            .with_context(|| format!("Failed to read replication position from {}", self.control_table))?;

        let Some(row) = rows.first() else {
            bail!("{} has no rows", self.control_table);
        };
        let schema: Option<i64> = row.get(0);
        let replication: Option<i64> = row.get(1);
        match (schema, replication) {
            (Some(schema), Some(replication)) => Ok(SyncPosition::new(schema, replication)),
            _ => bail!(
                "{} does not record a replication position",
                self.control_table
            ),
        }
    }

    async fn begin(&mut self) -> Result<()> {
        self.catalog.clear();
        self.batch("BEGIN").await
    }

    async fn has_table(&mut self, table: &TableName) -> Result<bool> {
        let client = self.client.lock().await;
        Ok(self.catalog.columns(&client, table).await?.is_some())
    }

    async fn apply(&mut self, mutation: &Mutation) -> Result<u64> {
        let client = self.client.lock().await;
        let columns = self.catalog.columns(&client, mutation.table()).await?;
        let statement = mutation.render(&PostgresDialect::new(columns));
        debug!("{statement}");

        let params: Vec<&(dyn ToSql + Sync)> = statement
            .params
            .iter()
            .map(|p| p as &(dyn ToSql + Sync))
            .collect();
        let affected = client.execute(statement.sql.as_str(), &params).await?;
        Ok(affected)
    }

    async fn savepoint(&mut self) -> Result<()> {
        self.batch(&format!("SAVEPOINT {SAVEPOINT}")).await
    }

    async fn release_savepoint(&mut self) -> Result<()> {
        self.batch(&format!("RELEASE SAVEPOINT {SAVEPOINT}")).await
    }

    async fn rollback_to_savepoint(&mut self) -> Result<()> {
        self.batch(&format!("ROLLBACK TO SAVEPOINT {SAVEPOINT}")).await
    }

    async fn write_position(&mut self, position: SyncPosition) -> Result<()> {
        let sql = format!(
            "UPDATE {} SET current_schema_sequence = $1::bigint, current_replication_sequence = $2::bigint",
            quote_qualified(&self.control_table)
        );
        let client = self.client.lock().await;
        let updated = client
            .execute(sql.as_str(), &[&position.schema_seq, &position.replication_seq])
            .await
            .with_context(|| format!("Failed to record position in {}", self.control_table))?;
        if updated == 0 {
            bail!("{} has no rows", self.control_table);
        }
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        self.batch("COMMIT").await
    }

    async fn rollback(&mut self) -> Result<()> {
        self.batch("ROLLBACK").await
    }

    fn describe(&self, mutation: &Mutation) -> Statement {
        mutation.render(&PostgresDialect::new(self.catalog.cached(mutation.table())))
    }
}
