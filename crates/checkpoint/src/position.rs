//! Replication watermark.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How far replication has progressed.
///
/// `schema_seq` must equal the schema sequence embedded in every packet that
/// is applied; `replication_seq` is the number of the last applied packet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyncPosition {
    pub schema_seq: i64,
    pub replication_seq: i64,
}

impl SyncPosition {
    pub fn new(schema_seq: i64, replication_seq: i64) -> Self {
        Self {
            schema_seq,
            replication_seq,
        }
    }

    /// Sequence number of the packet that has to be applied next.
    pub fn next_sequence(&self) -> i64 {
        self.replication_seq + 1
    }

    /// Position after applying packet `sequence` under the same schema.
    pub fn advanced_to(&self, sequence: i64) -> Self {
        Self {
            schema_seq: self.schema_seq,
            replication_seq: sequence,
        }
    }
}

impl fmt::Display for SyncPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "schema {}, replication {}",
            self.schema_seq, self.replication_seq
        )
    }
}
