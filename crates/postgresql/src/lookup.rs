use anyhow::{Context, Result};
use async_trait::async_trait;
use mbmirror_replication::{Dialect, Fields, RowLookup, TableName};
use pg_escape::quote_identifier;
use tokio::sync::Mutex;

use crate::catalog::ColumnCatalog;
use crate::client::SharedClient;
use crate::dialect::PostgresDialect;

/// [`RowLookup`] on the shared replay connection. All values come back as text.
pub struct PostgresRowLookup {
    client: SharedClient,
    catalog: Mutex<ColumnCatalog>,
}

impl PostgresRowLookup {
    pub fn new(client: SharedClient) -> Self {
        Self {
            client,
            catalog: Mutex::new(ColumnCatalog::new()),
        }
    }
}

#[async_trait]
impl RowLookup for PostgresRowLookup {
    async fn fetch_rows(
        &self,
        table: &TableName,
        key_column: &str,
        key: &str,
        columns: &[&str],
    ) -> Result<Vec<Fields>> {
        let client = self.client.lock().await;
        let mut catalog = self.catalog.lock().await;
        let table_columns = catalog.columns(&client, table).await?;
        let dialect = PostgresDialect::new(table_columns);

        let select: Vec<String> = columns
            .iter()
            .map(|c| format!("{}::text", quote_identifier(c)))
            .collect();
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = {}",
            select.join(", "),
            dialect.quote_table(table),
            quote_identifier(key_column),
            dialect.placeholder(table, key_column, 1)
        );

        let rows = client
            .query(sql.as_str(), &[&key])
            .await
            .with_context(|| format!("Failed to look up {table} {key_column}={key}"))?;

        Ok(rows
            .iter()
            .map(|row| {
                columns
                    .iter()
                    .enumerate()
                    .map(|(i, column)| (*column, row.get::<_, Option<String>>(i)))
                    .collect()
            })
            .collect())
    }
}
