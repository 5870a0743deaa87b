//! Observer callbacks around packet replay.

use anyhow::Result;
use async_trait::async_trait;
use mbmirror_dump::Fields;

use crate::names::TableName;

/// Callbacks invoked by the replay engine.
///
/// Every method defaults to a no-op so implementations only override what
/// they need. `before_*` runs before the mutation is executed and `after_*`
/// only once it succeeded. An error from any callback aborts the packet.
#[async_trait]
pub trait ReplicationHook: Send {
    async fn begin(&mut self, _sequence: i64) -> Result<()> {
        Ok(())
    }

    async fn before_insert(&mut self, _table: &TableName, _values: &Fields) -> Result<()> {
        Ok(())
    }

    async fn after_insert(&mut self, _table: &TableName, _values: &Fields) -> Result<()> {
        Ok(())
    }

    async fn before_update(
        &mut self,
        _table: &TableName,
        _keys: &Fields,
        _values: &Fields,
    ) -> Result<()> {
        Ok(())
    }

    async fn after_update(
        &mut self,
        _table: &TableName,
        _keys: &Fields,
        _values: &Fields,
    ) -> Result<()> {
        Ok(())
    }

    async fn before_delete(&mut self, _table: &TableName, _keys: &Fields) -> Result<()> {
        Ok(())
    }

    async fn after_delete(&mut self, _table: &TableName, _keys: &Fields) -> Result<()> {
        Ok(())
    }

    async fn before_commit(&mut self) -> Result<()> {
        Ok(())
    }

    async fn after_commit(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Hook that does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHook;

impl ReplicationHook for NoopHook {}

/// Fans every callback out to a list of hooks, in registration order.
#[derive(Default)]
pub struct HookChain {
    hooks: Vec<Box<dyn ReplicationHook>>,
}

impl HookChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, hook: Box<dyn ReplicationHook>) {
        self.hooks.push(hook);
    }

    pub fn with(mut self, hook: impl ReplicationHook + 'static) -> Self {
        self.hooks.push(Box::new(hook));
        self
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

#[async_trait]
impl ReplicationHook for HookChain {
    async fn begin(&mut self, sequence: i64) -> Result<()> {
        for hook in &mut self.hooks {
            hook.begin(sequence).await?;
        }
        Ok(())
    }

    async fn before_insert(&mut self, table: &TableName, values: &Fields) -> Result<()> {
        for hook in &mut self.hooks {
            hook.before_insert(table, values).await?;
        }
        Ok(())
    }

    async fn after_insert(&mut self, table: &TableName, values: &Fields) -> Result<()> {
        for hook in &mut self.hooks {
            hook.after_insert(table, values).await?;
        }
        Ok(())
    }

    async fn before_update(&mut self, table: &TableName, keys: &Fields, values: &Fields) -> Result<()> {
        for hook in &mut self.hooks {
            hook.before_update(table, keys, values).await?;
        }
        Ok(())
    }

    async fn after_update(&mut self, table: &TableName, keys: &Fields, values: &Fields) -> Result<()> {
        for hook in &mut self.hooks {
            hook.after_update(table, keys, values).await?;
        }
        Ok(())
    }

    async fn before_delete(&mut self, table: &TableName, keys: &Fields) -> Result<()> {
        for hook in &mut self.hooks {
            hook.before_delete(table, keys).await?;
        }
        Ok(())
    }

    async fn after_delete(&mut self, table: &TableName, keys: &Fields) -> Result<()> {
        for hook in &mut self.hooks {
            hook.after_delete(table, keys).await?;
        }
        Ok(())
    }

    async fn before_commit(&mut self) -> Result<()> {
        for hook in &mut self.hooks {
            hook.before_commit().await?;
        }
        Ok(())
    }

    async fn after_commit(&mut self) -> Result<()> {
        for hook in &mut self.hooks {
            hook.after_commit().await?;
        }
        Ok(())
    }
}

/// Read access to destination rows, for hooks that need more than the
/// packet carries (e.g. an entity's external id before it is deleted).
///
/// Lookups run on the replay connection and therefore see the packet's
/// uncommitted changes.
#[async_trait]
pub trait RowLookup: Send + Sync {
    /// Fetch `columns` of the rows where `key_column = key`.
    async fn fetch_rows(
        &self,
        table: &TableName,
        key_column: &str,
        key: &str,
        columns: &[&str],
    ) -> Result<Vec<Fields>>;
}
