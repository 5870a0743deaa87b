//! Decoder for the pending-operation dumps shipped inside replication packets
//!
//! The upstream producer writes its change log using the PostgreSQL `COPY`
//! text format: one row per line, columns separated by tabs, `\N` for SQL
//! NULL and backslash escapes for control characters. One of the columns
//! (the row payload) is itself a blob of `"column"='value'` pairs.
//!
//! This crate turns such a stream into typed rows:
//!
//! ```rust
//! use mbmirror_dump::{ColumnType, DumpReader, Value};
//!
//! let data = "1\tt\t\"id\"='5' \n";
//! let mut reader = DumpReader::new(
//!     data.as_bytes(),
//!     &[ColumnType::Int, ColumnType::Bool, ColumnType::Fields],
//! );
//! let row = reader.next().unwrap().unwrap();
//! assert_eq!(row[0], Value::Int(1));
//! assert_eq!(row[1], Value::Bool(true));
//! ```
//!
//! Rows are produced lazily and the reader is forward-only. A malformed line
//! stops decoding with a [`DumpError`]; there is no partial-row recovery.

mod error;
mod escape;
mod fields;
mod reader;

pub use error::{DumpError, Result};
pub use escape::unescape;
pub use fields::{parse_fields, Fields};
pub use reader::{ColumnType, DumpReader, Value};
