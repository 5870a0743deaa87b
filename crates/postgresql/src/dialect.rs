use mbmirror_replication::{Dialect, TableName};
use pg_escape::quote_identifier;

use crate::catalog::TableColumns;

/// PostgreSQL spelling of mutations.
///
/// Every parameter is bound as text and cast to the column's catalog type,
/// so one code path covers integers, uuids, timestamps, arrays and the rest.
#[derive(Debug, Default, Clone, Copy)]
pub struct PostgresDialect<'a> {
    columns: Option<&'a TableColumns>,
}

impl<'a> PostgresDialect<'a> {
    pub fn new(columns: Option<&'a TableColumns>) -> Self {
        Self { columns }
    }
}

impl Dialect for PostgresDialect<'_> {
    fn quote_table(&self, table: &TableName) -> String {
        format!(
            "{}.{}",
            quote_identifier(&table.schema),
            quote_identifier(&table.table)
        )
    }

    fn quote_column(&self, column: &str) -> String {
        quote_identifier(column).to_string()
    }

    fn placeholder(&self, _table: &TableName, column: &str, index: usize) -> String {
        match self.columns.and_then(|columns| columns.get(column)) {
            Some(sql_type) => format!("CAST(${index}::text AS {sql_type})"),
            None => format!("${index}::text"),
        }
    }

    fn null_safe_equals(&self) -> &'static str {
        "IS NOT DISTINCT FROM"
    }
}

/// Quote a possibly schema-qualified name such as `musicbrainz.replication_control`.
pub fn quote_qualified(name: &str) -> String {
    name.split('.')
        .map(|part| quote_identifier(part).to_string())
        .collect::<Vec<_>>()
        .join(".")
}
