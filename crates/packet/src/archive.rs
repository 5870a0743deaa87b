//! Decoding of `replication-<seq>.tar.bz2` archives.

use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

use bzip2::read::BzDecoder;
use mbmirror_replication::{PendingSet, ReplicationPacket};

use crate::error::{PacketError, Result};

const SCHEMA_SEQUENCE: &str = "SCHEMA_SEQUENCE";
const TIMESTAMP: &str = "TIMESTAMP";

/// Member names of the operations dump, current name first.
pub const PENDING_MEMBERS: &[&str] = &["mbdump/dbmirror_pending", "mbdump/Pending"];

/// Member names of the payload dump, current name first.
pub const PENDING_DATA_MEMBERS: &[&str] = &["mbdump/dbmirror_pendingdata", "mbdump/PendingData"];

/// File name of packet `sequence`.
pub fn packet_file_name(sequence: i64) -> String {
    format!("replication-{sequence}.tar.bz2")
}

/// Decode a bzip2-compressed tar archive into a packet.
///
/// Members are handled in archive order. Unknown members are skipped.
pub fn read_packet<R: Read>(sequence: i64, reader: R) -> Result<ReplicationPacket> {
    let mut archive = tar::Archive::new(BzDecoder::new(reader));
    let mut packet = ReplicationPacket::new(sequence);
    let mut pending = PendingSet::new();
    let mut seen_operations = false;
    let mut seen_data = false;

    for entry in archive.entries()? {
        let mut entry = entry?;
        let name = entry.path()?.to_string_lossy().into_owned();
        let name = name.trim_start_matches("./");

        if name == SCHEMA_SEQUENCE {
            let text = read_member(&mut entry)?;
            let schema = text.trim().parse::<i64>().map_err(|_| {
                PacketError::Archive(format!("invalid {SCHEMA_SEQUENCE} content {text:?}"))
            })?;
            packet.schema_sequence = Some(schema);
        } else if name == TIMESTAMP {
            packet.timestamp = Some(read_member(&mut entry)?.trim().to_string());
        } else if PENDING_MEMBERS.contains(&name) {
            pending.load_operations(BufReader::new(&mut entry))?;
            seen_operations = true;
        } else if PENDING_DATA_MEMBERS.contains(&name) {
            pending.load_operation_data(BufReader::new(&mut entry))?;
            seen_data = true;
        } else {
            tracing::trace!("Skipping archive member {name}");
        }
    }

    if !seen_operations {
        return Err(PacketError::MissingMember(PENDING_MEMBERS[0]));
    }
    if !seen_data {
        return Err(PacketError::MissingMember(PENDING_DATA_MEMBERS[0]));
    }

    tracing::debug!(
        "Decoded packet {sequence}: {} operations",
        pending.operation_count()
    );
    packet.pending = pending;
    Ok(packet)
}

fn read_member<R: Read>(entry: &mut R) -> Result<String> {
    let mut text = String::new();
    entry.read_to_string(&mut text)?;
    Ok(text)
}

/// Decode a spooled archive on the blocking pool.
pub(crate) async fn read_spooled(sequence: i64, mut file: File) -> Result<ReplicationPacket> {
    tokio::task::spawn_blocking(move || {
        file.rewind()?;
        read_packet(sequence, BufReader::new(file))
    })
    .await?
}

/// Decode a packet archive from disk.
pub async fn read_packet_file(sequence: i64, path: impl AsRef<Path>) -> Result<ReplicationPacket> {
    let file = File::open(path.as_ref())?;
    read_spooled(sequence, file).await
}
