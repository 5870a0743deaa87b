//! Row mutations and their SQL rendering.
//!
//! A [`Mutation`] is the backend-neutral form of one replayed operation. It
//! is rendered to a parameterized [`Statement`] through a [`Dialect`], which
//! decides identifier quoting and placeholder syntax. Values stay text all
//! the way through; typing them is the dialect's business.

use std::fmt;

use mbmirror_dump::Fields;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::names::TableName;
use crate::pending::OpKind;

/// What an insert does when the row already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InsertConflict {
    /// Let the database reject the duplicate.
    #[default]
    Fail,
    /// Keep the existing row.
    Ignore,
}

impl std::str::FromStr for InsertConflict {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fail" => Ok(InsertConflict::Fail),
            "ignore" => Ok(InsertConflict::Ignore),
            other => anyhow::bail!("Unknown insert conflict policy: {other}"),
        }
    }
}

/// How a key column is compared in a WHERE clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    /// `col = ?`
    Eq,
    /// `col IS ?`, used for NULL keys since `= NULL` never matches.
    Is,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    pub column: String,
    pub comparison: Comparison,
    pub value: Option<String>,
}

impl Predicate {
    pub fn new(column: impl Into<String>, value: Option<String>) -> Self {
        let comparison = if value.is_some() {
            Comparison::Eq
        } else {
            Comparison::Is
        };
        Self {
            column: column.into(),
            comparison,
            value,
        }
    }
}

/// Reasons an operation cannot be turned into a mutation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("{kind} on {table} has no key columns")]
    MissingKeys { kind: &'static str, table: String },

    #[error("insert into {table} has no values")]
    MissingValues { table: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    Insert {
        table: TableName,
        values: Fields,
        on_conflict: InsertConflict,
    },
    Update {
        table: TableName,
        values: Fields,
        keys: Vec<Predicate>,
    },
    Delete {
        table: TableName,
        keys: Vec<Predicate>,
    },
}

impl Mutation {
    /// Build the mutation for one operation.
    ///
    /// Returns `Ok(None)` for an update that changes nothing. An update or
    /// delete without keys would touch every row and is refused, as is an
    /// insert without values.
    pub fn build(
        kind: OpKind,
        table: TableName,
        keys: &Fields,
        values: &Fields,
        on_conflict: InsertConflict,
    ) -> Result<Option<Mutation>, BuildError> {
        match kind {
            OpKind::Insert => {
                if values.is_empty() {
                    return Err(BuildError::MissingValues {
                        table: table.qualified(),
                    });
                }
                Ok(Some(Mutation::Insert {
                    table,
                    values: values.clone(),
                    on_conflict,
                }))
            }
            OpKind::Update => {
                let keys = predicates(kind, &table, keys)?;
                if values.is_empty() {
                    return Ok(None);
                }
                Ok(Some(Mutation::Update {
                    table,
                    values: values.clone(),
                    keys,
                }))
            }
            OpKind::Delete => {
                let keys = predicates(kind, &table, keys)?;
                Ok(Some(Mutation::Delete { table, keys }))
            }
        }
    }

    pub fn table(&self) -> &TableName {
        match self {
            Mutation::Insert { table, .. }
            | Mutation::Update { table, .. }
            | Mutation::Delete { table, .. } => table,
        }
    }

    pub fn kind(&self) -> OpKind {
        match self {
            Mutation::Insert { .. } => OpKind::Insert,
            Mutation::Update { .. } => OpKind::Update,
            Mutation::Delete { .. } => OpKind::Delete,
        }
    }

    pub fn render(&self, dialect: &dyn Dialect) -> Statement {
        let mut params = Vec::new();
        let sql = match self {
            Mutation::Insert {
                table,
                values,
                on_conflict,
            } => {
                let mut columns = Vec::with_capacity(values.len());
                let mut placeholders = Vec::with_capacity(values.len());
                for (column, value) in values.iter() {
                    params.push(value.map(str::to_string));
                    columns.push(dialect.quote_column(column));
                    placeholders.push(dialect.placeholder(table, column, params.len()));
                }
                let mut sql = format!(
                    "INSERT INTO {} ({}) VALUES ({})",
                    dialect.quote_table(table),
                    columns.join(", "),
                    placeholders.join(", ")
                );
                if *on_conflict == InsertConflict::Ignore {
                    sql.push(' ');
                    sql.push_str(dialect.on_conflict_do_nothing());
                }
                sql
            }
            Mutation::Update {
                table,
                values,
                keys,
            } => {
                let mut assignments = Vec::with_capacity(values.len());
                for (column, value) in values.iter() {
                    params.push(value.map(str::to_string));
                    assignments.push(format!(
                        "{} = {}",
                        dialect.quote_column(column),
                        dialect.placeholder(table, column, params.len())
                    ));
                }
                format!(
                    "UPDATE {} SET {} WHERE {}",
                    dialect.quote_table(table),
                    assignments.join(", "),
                    where_clause(dialect, table, keys, &mut params)
                )
            }
            Mutation::Delete { table, keys } => format!(
                "DELETE FROM {} WHERE {}",
                dialect.quote_table(table),
                where_clause(dialect, table, keys, &mut params)
            ),
        };
        Statement { sql, params }
    }
}

fn predicates(kind: OpKind, table: &TableName, keys: &Fields) -> Result<Vec<Predicate>, BuildError> {
    if keys.is_empty() {
        return Err(BuildError::MissingKeys {
            kind: kind.as_str(),
            table: table.qualified(),
        });
    }
    Ok(keys
        .iter()
        .map(|(column, value)| Predicate::new(column, value.map(str::to_string)))
        .collect())
}

fn where_clause(
    dialect: &dyn Dialect,
    table: &TableName,
    keys: &[Predicate],
    params: &mut Vec<Option<String>>,
) -> String {
    keys.iter()
        .map(|key| {
            params.push(key.value.clone());
            let operator = match key.comparison {
                Comparison::Eq => "=",
                Comparison::Is => dialect.null_safe_equals(),
            };
            format!(
                "{} {} {}",
                dialect.quote_column(&key.column),
                operator,
                dialect.placeholder(table, &key.column, params.len())
            )
        })
        .collect::<Vec<_>>()
        .join(" AND ")
}

/// SQL spelling of a backend.
pub trait Dialect: Send + Sync {
    fn quote_table(&self, table: &TableName) -> String;

    fn quote_column(&self, column: &str) -> String;

    /// Placeholder for the `index`-th parameter (1-based) bound to `column`.
    fn placeholder(&self, table: &TableName, column: &str, index: usize) -> String;

    /// Operator matching NULL against a bound parameter.
    fn null_safe_equals(&self) -> &'static str {
        "IS"
    }

    fn on_conflict_do_nothing(&self) -> &'static str {
        "ON CONFLICT DO NOTHING"
    }
}

/// Unquoted names and `?` placeholders. Used for logging and tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct GenericDialect;

impl Dialect for GenericDialect {
    fn quote_table(&self, table: &TableName) -> String {
        table.qualified()
    }

    fn quote_column(&self, column: &str) -> String {
        column.to_string()
    }

    fn placeholder(&self, _table: &TableName, _column: &str, _index: usize) -> String {
        "?".to_string()
    }
}

/// A rendered statement with its positional text parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Option<String>>,
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params: Vec<String> = self
            .params
            .iter()
            .map(|p| match p {
                Some(v) => format!("{v:?}"),
                None => "NULL".to_string(),
            })
            .collect();
        write!(f, "{} [{}]", self.sql, params.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, Option<&str>)]) -> Fields {
        pairs
            .iter()
            .map(|(k, v)| (*k, v.map(str::to_string)))
            .collect()
    }

    fn artist() -> TableName {
        TableName::new("musicbrainz", "artist")
    }

    #[test]
    fn test_null_key_uses_is() {
        let keys = fields(&[("id", Some("5")), ("parent", None)]);
        let mutation = Mutation::build(
            OpKind::Delete,
            artist(),
            &keys,
            &Fields::new(),
            InsertConflict::Fail,
        )
        .unwrap()
        .unwrap();

        let statement = mutation.render(&GenericDialect);
        assert_eq!(
            statement.sql,
            "DELETE FROM musicbrainz.artist WHERE id = ? AND parent IS ?"
        );
        assert_eq!(statement.params, vec![Some("5".to_string()), None]);
    }

    #[test]
    fn test_update_rendering() {
        let keys = fields(&[("id", Some("1"))]);
        let values = fields(&[("name", Some("Bar")), ("comment", None)]);
        let statement = Mutation::build(OpKind::Update, artist(), &keys, &values, InsertConflict::Fail)
            .unwrap()
            .unwrap()
            .render(&GenericDialect);

        assert_eq!(
            statement.sql,
            "UPDATE musicbrainz.artist SET name = ?, comment = ? WHERE id = ?"
        );
        assert_eq!(
            statement.params,
            vec![Some("Bar".to_string()), None, Some("1".to_string())]
        );
    }

    #[test]
    fn test_insert_rendering_and_conflict_policy() {
        let values = fields(&[("id", Some("1")), ("name", Some("Foo"))]);
        let plain = Mutation::build(OpKind::Insert, artist(), &Fields::new(), &values, InsertConflict::Fail)
            .unwrap()
            .unwrap()
            .render(&GenericDialect);
        assert_eq!(
            plain.sql,
            "INSERT INTO musicbrainz.artist (id, name) VALUES (?, ?)"
        );

        let ignoring = Mutation::build(OpKind::Insert, artist(), &Fields::new(), &values, InsertConflict::Ignore)
            .unwrap()
            .unwrap()
            .render(&GenericDialect);
        assert!(ignoring.sql.ends_with("ON CONFLICT DO NOTHING"));
    }

    #[test]
    fn test_refuses_unkeyed_update_and_delete() {
        let values = fields(&[("name", Some("x"))]);
        for kind in [OpKind::Update, OpKind::Delete] {
            let err = Mutation::build(kind, artist(), &Fields::new(), &values, InsertConflict::Fail)
                .unwrap_err();
            assert!(matches!(err, BuildError::MissingKeys { .. }));
        }
    }

    #[test]
    fn test_refuses_empty_insert() {
        let err = Mutation::build(OpKind::Insert, artist(), &Fields::new(), &Fields::new(), InsertConflict::Fail)
            .unwrap_err();
        assert_eq!(
            err,
            BuildError::MissingValues {
                table: "musicbrainz.artist".to_string()
            }
        );
    }

    #[test]
    fn test_update_without_values_is_noop() {
        let keys = fields(&[("id", Some("1"))]);
        let built =
            Mutation::build(OpKind::Update, artist(), &keys, &Fields::new(), InsertConflict::Fail)
                .unwrap();
        assert!(built.is_none());
    }

    #[test]
    fn test_statement_display() {
        let statement = Statement {
            sql: "DELETE FROM t WHERE a = ? AND b IS ?".to_string(),
            params: vec![Some("1".to_string()), None],
        };
        assert_eq!(
            statement.to_string(),
            "DELETE FROM t WHERE a = ? AND b IS ? [\"1\", NULL]"
        );
    }

    #[test]
    fn test_insert_conflict_parse() {
        assert_eq!("ignore".parse::<InsertConflict>().unwrap(), InsertConflict::Ignore);
        assert!("skip".parse::<InsertConflict>().is_err());
    }
}
