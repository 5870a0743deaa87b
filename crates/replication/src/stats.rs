use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::names::TableName;
use crate::pending::OpKind;

/// Mutation counters of one table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TableStats {
    pub inserted: u64,
    pub updated: u64,
    pub deleted: u64,
    pub failed: u64,
}

impl TableStats {
    pub fn total(&self) -> u64 {
        self.inserted + self.updated + self.deleted
    }
}

impl fmt::Display for TableStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "insert: {}, update: {}, delete: {}",
            self.inserted, self.updated, self.deleted
        )?;
        if self.failed > 0 {
            write!(f, ", failed: {}", self.failed)?;
        }
        Ok(())
    }
}

/// Per-table statistics of one replayed packet, keyed by `schema.table`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReplayStats {
    tables: BTreeMap<String, TableStats>,
}

impl ReplayStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, table: &TableName, kind: OpKind) {
        let entry = self.tables.entry(table.qualified()).or_default();
        match kind {
            OpKind::Insert => entry.inserted += 1,
            OpKind::Update => entry.updated += 1,
            OpKind::Delete => entry.deleted += 1,
        }
    }

    pub fn record_failure(&mut self, table: &TableName) {
        self.tables.entry(table.qualified()).or_default().failed += 1;
    }

    /// Add the counters of `other` to these.
    pub fn merge(&mut self, other: &ReplayStats) {
        for (name, stats) in &other.tables {
            let entry = self.tables.entry(name.clone()).or_default();
            entry.inserted += stats.inserted;
            entry.updated += stats.updated;
            entry.deleted += stats.deleted;
            entry.failed += stats.failed;
        }
    }

    pub fn table(&self, qualified: &str) -> Option<&TableStats> {
        self.tables.get(qualified)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TableStats)> {
        self.tables.iter().map(|(name, stats)| (name.as_str(), stats))
    }

    pub fn failed(&self) -> u64 {
        self.tables.values().map(|s| s.failed).sum()
    }

    pub fn applied(&self) -> u64 {
        self.tables.values().map(TableStats::total).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
