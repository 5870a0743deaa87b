//! Transaction reconstruction and replay for replication packets
//!
//! A replication packet carries the row changes committed upstream since the
//! previous packet, as two dumps: the operations (`row_id`, table, kind,
//! transaction id) and their payloads (key and value column maps). This crate
//!
//! - resolves the upstream table references to destination tables ([`NameResolver`]),
//! - regroups the operations into upstream transactions ([`PendingSet`]),
//! - turns each operation into a [`Mutation`] and applies it through a
//!   [`ReplicationTarget`], calling [`ReplicationHook`]s around every step
//!   ([`ReplayEngine`]).
//!
//! Nothing here knows about HTTP or a concrete database driver.

mod error;
mod hook;
mod mutation;
mod names;
mod pending;
mod replay;
mod stats;
mod target;

pub mod testing;

pub use error::{ReplicationError, Result};
pub use hook::{HookChain, NoopHook, ReplicationHook, RowLookup};
pub use mutation::{
    BuildError, Comparison, Dialect, GenericDialect, InsertConflict, Mutation, Predicate,
    Statement,
};
pub use names::{
    NameMapping, NameResolver, Resolution, TableName, DEFAULT_SOURCE_SCHEMA, IGNORE_SCHEMA,
};
pub use pending::{OpKind, PendingOperation, PendingSet, ReplicationPacket, Transaction};
pub use replay::{Durability, ReplayEngine};
pub use stats::{ReplayStats, TableStats};
pub use target::ReplicationTarget;

pub use checkpoint::SyncPosition;
pub use mbmirror_dump::Fields;
