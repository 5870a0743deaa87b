//! mbmirror
//!
//! Keeps a PostgreSQL copy of the MusicBrainz database current by applying
//! the replication packets published upstream.
//!
//! The heavy lifting lives in the workspace crates:
//!
//! - `mbmirror_dump` - decoding of the tab-separated dump streams
//! - `mbmirror_replication` - name resolution, transaction reconstruction, replay and hooks
//! - `mbmirror_packet` - HTTP and local directory packet sources
//! - `mbmirror_postgresql` - the PostgreSQL target
//! - `checkpoint` - the replication position and the status report
//!
//! This crate adds the configuration file, the sync loop and the audit and
//! search index hooks.
//!
//! # CLI Usage
//!
//! ```bash
//! # Apply every packet newer than the database position
//! mbmirror --config mbmirror.toml sync
//!
//! # Apply downloaded packets, in order
//! mbmirror replay replication-151234.tar.bz2 replication-151235.tar.bz2
//!
//! # Show where replication stands
//! mbmirror status
//! ```

pub mod config;
pub mod hooks;
pub mod sync;

pub use config::{Config, Overrides};
pub use sync::{replay_files, run_sync, SyncState, SyncSummary};
