//! Column types of destination tables.

use std::collections::HashMap;

use anyhow::{Context, Result};
use mbmirror_replication::TableName;
use tokio_postgres::Client;

const COLUMNS_QUERY: &str = "\
SELECT a.attname, format_type(a.atttypid, a.atttypmod)
FROM pg_catalog.pg_attribute a
JOIN pg_catalog.pg_class c ON c.oid = a.attrelid
JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
WHERE n.nspname = $1 AND c.relname = $2 AND a.attnum > 0 AND NOT a.attisdropped";

/// Column name to SQL type (as printed by `format_type`).
pub type TableColumns = HashMap<String, String>;

/// Lazily filled cache of table column types. `None` marks a missing table.
#[derive(Debug, Default)]
pub struct ColumnCatalog {
    tables: HashMap<TableName, Option<TableColumns>>,
}

impl ColumnCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Columns of `table`, querying the database on first use.
    pub async fn columns(&mut self, client: &Client, table: &TableName) -> Result<Option<&TableColumns>> {
        if !self.tables.contains_key(table) {
            let rows = client
                .query(COLUMNS_QUERY, &[&table.schema, &table.table])
                .await
                .with_context(|| format!("Failed to read columns of {table}"))?;
            let columns: TableColumns = rows
                .iter()
                .map(|row| (row.get::<_, String>(0), row.get::<_, String>(1)))
                .collect();
            tracing::debug!("Table {table} has {} columns", columns.len());
            let entry = if columns.is_empty() { None } else { Some(columns) };
            self.tables.insert(table.clone(), entry);
        }
        Ok(self.tables.get(table).and_then(Option::as_ref))
    }

    /// Columns of `table` if already loaded.
    pub fn cached(&self, table: &TableName) -> Option<&TableColumns> {
        self.tables.get(table).and_then(Option::as_ref)
    }

    pub fn clear(&mut self) {
        self.tables.clear();
    }
}
