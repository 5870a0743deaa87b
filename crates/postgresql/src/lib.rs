//! PostgreSQL destination for mbmirror
//!
//! - [`PostgresTarget`] applies replayed mutations and keeps the
//!   `(schema, replication)` watermark in a control table.
//! - [`PostgresRowLookup`] lets hooks read destination rows on the same
//!   connection.
//! - [`PostgresDialect`] renders mutations with quoted identifiers and
//!   text parameters cast to the catalog column types.

mod catalog;
mod client;
mod dialect;
mod lookup;
mod target;

pub use catalog::{ColumnCatalog, TableColumns};
pub use client::{connect, SharedClient};
pub use dialect::{quote_qualified, PostgresDialect};
pub use lookup::PostgresRowLookup;
pub use target::{PostgresTarget, DEFAULT_CONTROL_TABLE};
