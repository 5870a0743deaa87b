//! Shared fixtures for replay tests.

#![allow(dead_code)]

pub use mbmirror_replication::testing::{MemoryTarget, RecordingHook};
use mbmirror_replication::{PendingSet, ReplicationPacket};

/// Build a packet from the two dump texts.
pub fn packet(sequence: i64, schema: i64, operations: &str, data: &str) -> ReplicationPacket {
    let mut pending = PendingSet::new();
    pending.load_operations(operations.as_bytes()).unwrap();
    pending.load_operation_data(data.as_bytes()).unwrap();
    ReplicationPacket {
        sequence,
        schema_sequence: Some(schema),
        timestamp: Some("2024-01-01 00:00:00+00".to_string()),
        pending,
    }
}
