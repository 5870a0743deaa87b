use mbmirror_dump::DumpError;
use thiserror::Error;

/// Errors raised while loading or replaying a packet.
///
/// Everything here aborts the current cycle. Mutation failures only surface
/// as an error in strict durability mode; in best-effort mode they are
/// logged and counted instead.
#[derive(Error, Debug)]
pub enum ReplicationError {
    #[error("Schema sequence mismatch: database is at {expected}, packet has {found}")]
    SchemaMismatch { expected: i64, found: i64 },

    #[error("Packet {sequence} carries no schema sequence")]
    MissingSchemaSequence { sequence: i64 },

    #[error("Dump error: {0}")]
    Dump(#[from] DumpError),

    #[error("Invalid pending operation {row_id}: {reason}")]
    InvalidPending { row_id: i64, reason: String },

    #[error("Mutation failed: {statement}: {source:#}")]
    Mutation {
        statement: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Hook {callback} failed: {source:#}")]
    Hook {
        callback: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("Target error: {0:#}")]
    Target(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, ReplicationError>;
