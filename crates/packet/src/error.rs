use mbmirror_replication::ReplicationError;
use thiserror::Error;

/// Errors raised while obtaining or decoding a packet.
///
/// A packet that does not exist yet is not an error; sources return
/// `Ok(None)` for it.
#[derive(Error, Debug)]
pub enum PacketError {
    #[error("Failed to fetch {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Fetching {url} failed with status {status}")]
    Status { url: String, status: u16 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid packet archive: {0}")]
    Archive(String),

    #[error("Packet archive has no {0} member")]
    MissingMember(&'static str),

    #[error("Failed to decode packet: {0}")]
    Dump(#[from] ReplicationError),

    #[error("Packet decoding task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, PacketError>;
