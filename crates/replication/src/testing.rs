//! In-memory replay target and a recording hook, for tests of code that
//! drives the replay engine.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use async_trait::async_trait;
use checkpoint::SyncPosition;
use mbmirror_dump::Fields;

use crate::hook::ReplicationHook;
use crate::mutation::{Comparison, GenericDialect, InsertConflict, Mutation, Predicate};
use crate::names::TableName;
use crate::target::ReplicationTarget;

type Tables = BTreeMap<TableName, Vec<Fields>>;

/// Target that keeps rows in memory and interprets mutations itself.
#[derive(Default)]
pub struct MemoryTarget {
    committed: Tables,
    working: Option<Tables>,
    savepoint: Option<Tables>,
    pub position: SyncPosition,
    pending_position: Option<SyncPosition>,
    /// Rendered statements, in execution order.
    pub statements: Vec<String>,
    /// Mutations against this table fail.
    pub fail_table: Option<String>,
    pub commits: usize,
    pub rollbacks: usize,
}

impl MemoryTarget {
    pub fn new(position: SyncPosition, tables: &[&str]) -> Self {
        let committed = tables
            .iter()
            .map(|t| (TableName::new("musicbrainz", *t), Vec::new()))
            .collect();
        Self {
            committed,
            position,
            ..Default::default()
        }
    }

    pub fn rows(&self, table: &str) -> Vec<Fields> {
        self.committed
            .get(&TableName::new("musicbrainz", table))
            .cloned()
            .unwrap_or_default()
    }

    fn tables_mut(&mut self) -> Result<&mut Tables> {
        match self.working.as_mut() {
            Some(tables) => Ok(tables),
            None => bail!("no open transaction"),
        }
    }
}

fn matches(row: &Fields, keys: &[Predicate]) -> bool {
    keys.iter().all(|key| {
        let actual = row.get(&key.column).flatten();
        match key.comparison {
            Comparison::Eq => actual.is_some() && actual == key.value.as_deref(),
            Comparison::Is => actual == key.value.as_deref(),
        }
    })
}

#[async_trait]
impl ReplicationTarget for MemoryTarget {
    async fn read_position(&mut self) -> Result<SyncPosition> {
        Ok(self.position)
    }

    async fn begin(&mut self) -> Result<()> {
        self.working = Some(self.committed.clone());
        Ok(())
    }

    async fn has_table(&mut self, table: &TableName) -> Result<bool> {
        Ok(self.committed.contains_key(table))
    }

    async fn apply(&mut self, mutation: &Mutation) -> Result<u64> {
        self.statements
            .push(mutation.render(&GenericDialect).to_string());
        if self.fail_table.as_deref() == Some(mutation.table().table.as_str()) {
            bail!("forced failure on {}", mutation.table());
        }

        let rows = match self.tables_mut()?.get_mut(mutation.table()) {
            Some(rows) => rows,
            None => bail!("relation {} does not exist", mutation.table()),
        };
        match mutation {
            Mutation::Insert {
                values,
                on_conflict,
                ..
            } => {
                let id = values.value("id");
                if id.is_some() && rows.iter().any(|row| row.value("id") == id) {
                    if *on_conflict == InsertConflict::Ignore {
                        return Ok(0);
                    }
                    bail!("duplicate key value violates unique constraint");
                }
                rows.push(values.clone());
                Ok(1)
            }
            Mutation::Update { values, keys, .. } => {
                let mut affected = 0;
                for row in rows.iter_mut().filter(|row| matches(row, keys)) {
                    for (column, value) in values.iter() {
                        row.insert(column, value.map(str::to_string));
                    }
                    affected += 1;
                }
                Ok(affected)
            }
            Mutation::Delete { keys, .. } => {
                let before = rows.len();
                rows.retain(|row| !matches(row, keys));
                Ok((before - rows.len()) as u64)
            }
        }
    }

    async fn savepoint(&mut self) -> Result<()> {
        self.savepoint = Some(self.tables_mut()?.clone());
        Ok(())
    }

    async fn release_savepoint(&mut self) -> Result<()> {
        self.savepoint = None;
        Ok(())
    }

    async fn rollback_to_savepoint(&mut self) -> Result<()> {
        match self.savepoint.take() {
            Some(snapshot) => {
                self.working = Some(snapshot);
                Ok(())
            }
            None => bail!("no savepoint"),
        }
    }

    async fn write_position(&mut self, position: SyncPosition) -> Result<()> {
        self.pending_position = Some(position);
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        match self.working.take() {
            Some(tables) => self.committed = tables,
            None => bail!("no open transaction"),
        }
        if let Some(position) = self.pending_position.take() {
            self.position = position;
        }
        self.commits += 1;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.working = None;
        self.savepoint = None;
        self.pending_position = None;
        self.rollbacks += 1;
        Ok(())
    }
}

/// Hook that records every callback as a line of text.
#[derive(Clone, Default)]
pub struct RecordingHook {
    pub events: Arc<Mutex<Vec<String>>>,
}

impl RecordingHook {
    pub fn events(&self) -> Vec<String> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn push(&self, event: String) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

#[async_trait]
impl ReplicationHook for RecordingHook {
    async fn begin(&mut self, sequence: i64) -> Result<()> {
        self.push(format!("begin {sequence}"));
        Ok(())
    }

    async fn before_insert(&mut self, table: &TableName, _values: &Fields) -> Result<()> {
        self.push(format!("before_insert {table}"));
        Ok(())
    }

    async fn after_insert(&mut self, table: &TableName, _values: &Fields) -> Result<()> {
        self.push(format!("after_insert {table}"));
        Ok(())
    }

    async fn before_update(&mut self, table: &TableName, _keys: &Fields, _values: &Fields) -> Result<()> {
        self.push(format!("before_update {table}"));
        Ok(())
    }

    async fn after_update(&mut self, table: &TableName, _keys: &Fields, _values: &Fields) -> Result<()> {
        self.push(format!("after_update {table}"));
        Ok(())
    }

    async fn before_delete(&mut self, table: &TableName, _keys: &Fields) -> Result<()> {
        self.push(format!("before_delete {table}"));
        Ok(())
    }

    async fn after_delete(&mut self, table: &TableName, _keys: &Fields) -> Result<()> {
        self.push(format!("after_delete {table}"));
        Ok(())
    }

    async fn before_commit(&mut self) -> Result<()> {
        self.push("before_commit".to_string());
        Ok(())
    }

    async fn after_commit(&mut self) -> Result<()> {
        self.push("after_commit".to_string());
        Ok(())
    }
}
