//! Mapping of dump table references to destination tables.
//!
//! Pending operations name their table as `"schema"."table"` (or a bare
//! `table` in old packets). The resolver turns that into the physical
//! destination, applying the configured schema remapping and the ignore
//! sets.

use std::collections::{HashMap, HashSet};
use std::fmt;

/// Mapping target that marks a logical schema as dropped.
pub const IGNORE_SCHEMA: &str = "<ignore>";

/// Schema assumed for unqualified table references.
pub const DEFAULT_SOURCE_SCHEMA: &str = "musicbrainz";

/// A destination table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableName {
    pub schema: String,
    pub table: String,
}

impl TableName {
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
        }
    }

    /// Fully-qualified `schema.table`, unquoted.
    pub fn qualified(&self) -> String {
        format!("{}.{}", self.schema, self.table)
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.table)
    }
}

/// Logical → physical schema names, identity for anything unmapped.
#[derive(Debug, Clone, Default)]
pub struct NameMapping {
    schemas: HashMap<String, String>,
}

impl NameMapping {
    pub fn new(schemas: HashMap<String, String>) -> Self {
        Self { schemas }
    }

    pub fn schema<'a>(&'a self, logical: &'a str) -> &'a str {
        self.schemas
            .get(logical)
            .map(String::as_str)
            .unwrap_or(logical)
    }
}

/// Outcome of resolving a dump table reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Replay against this table.
    Table(TableName),
    /// Intentionally dropped; the row must not be replayed or reported.
    Ignored(TableName),
}

/// Resolves raw table references using a [`NameMapping`] and ignore sets.
#[derive(Debug, Clone)]
pub struct NameResolver {
    source_schema: String,
    mapping: NameMapping,
    ignored_schemas: HashSet<String>,
    ignored_tables: HashSet<String>,
}

impl Default for NameResolver {
    fn default() -> Self {
        Self::new(DEFAULT_SOURCE_SCHEMA, NameMapping::default())
    }
}

impl NameResolver {
    pub fn new(source_schema: impl Into<String>, mapping: NameMapping) -> Self {
        Self {
            source_schema: source_schema.into(),
            mapping,
            ignored_schemas: HashSet::new(),
            ignored_tables: HashSet::new(),
        }
    }

    /// Ignore every table of these schemas (logical or physical names).
    pub fn with_ignored_schemas<I, S>(mut self, schemas: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignored_schemas
            .extend(schemas.into_iter().map(Into::into));
        self
    }

    /// Ignore these tables, given bare (`artist`) or qualified
    /// (`musicbrainz.artist`, logical schema) names.
    pub fn with_ignored_tables<I, S>(mut self, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignored_tables
            .extend(tables.into_iter().map(Into::into));
        self
    }

    pub fn source_schema(&self) -> &str {
        &self.source_schema
    }

    pub fn mapping(&self) -> &NameMapping {
        &self.mapping
    }

    /// Resolve a raw `schema.table` or `table` reference.
    pub fn resolve(&self, raw_ref: &str) -> Resolution {
        let (logical_schema, table) = match raw_ref.split_once('.') {
            Some((schema, table)) => (strip_quotes(schema), strip_quotes(table)),
            None => (self.source_schema.as_str(), strip_quotes(raw_ref)),
        };
        let physical_schema = self.mapping.schema(logical_schema);
        let name = TableName::new(physical_schema, table);

        let ignored = physical_schema == IGNORE_SCHEMA
            || self.ignored_schemas.contains(logical_schema)
            || self.ignored_schemas.contains(physical_schema)
            || self.ignored_tables.contains(table)
            || self
                .ignored_tables
                .contains(&format!("{logical_schema}.{table}"));

        if ignored {
            Resolution::Ignored(name)
        } else {
            Resolution::Table(name)
        }
    }
}

fn strip_quotes(s: &str) -> &str {
    s.trim().trim_matches('"')
}
