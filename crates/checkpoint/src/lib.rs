//! Sync position and status tracking for mbmirror
//!
//! Two kinds of progress information live here:
//!
//! - [`SyncPosition`] - the `(schema_seq, replication_seq)` watermark. The
//!   authoritative copy is stored in the destination database itself and is
//!   read back at the start of every run.
//! - [`StatusReport`] - a small observability artifact mirroring the
//!   position plus the time of the last applied packet and of the last clean
//!   exhaustion. It is diagnostic only and never used to resume.
//!
//! ## Storage Backends
//!
//! - `FilesystemStore` - Writes the status report as a JSON file, replaced atomically
//! - `NullStore` - Discards everything (status reporting disabled)

mod filesystem;
mod position;
mod status;
pub mod store;


pub use filesystem::FilesystemStore;
pub use position::SyncPosition;
pub use status::{StatusReport, STATUS_TIME_FORMAT};
pub use store::{NullStore, StatusStore};
