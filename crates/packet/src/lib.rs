//! Replication packet sources
//!
//! Packets are published as `replication-<seq>.tar.bz2` archives, one per
//! replication sequence number. Each archive holds:
//!
//! - `SCHEMA_SEQUENCE` - the schema version the packet was produced against
//! - `TIMESTAMP` - when it was produced (informational)
//! - the pending operations and pending data dumps, under either their
//!   current (`mbdump/dbmirror_pending*`) or legacy (`mbdump/Pending*`) names
//!
//! # Source Types
//!
//! - [`HttpPacketSource`]: the upstream HTTP endpoint, optionally with an access token
//! - [`DirectoryPacketSource`]: archives already on disk
//!
//! Both report a packet that does not exist yet as `Ok(None)`.

mod archive;
mod error;
mod http;
mod local;

use async_trait::async_trait;
use mbmirror_replication::ReplicationPacket;

pub use archive::{
    packet_file_name, read_packet, read_packet_file, PENDING_DATA_MEMBERS, PENDING_MEMBERS,
};
pub use error::{PacketError, Result};
pub use http::{HttpPacketSource, DEFAULT_TIMEOUT};
pub use local::DirectoryPacketSource;

/// Where replication packets come from.
#[async_trait]
pub trait PacketSource: Send + Sync {
    /// Fetch and decode packet `sequence`, or `None` if it is not available yet.
    async fn fetch(&self, sequence: i64) -> Result<Option<ReplicationPacket>>;

    /// Human-readable location of packet `sequence`, for logs.
    fn describe(&self, sequence: i64) -> String;
}
