//! Synthetic packet archives for sync loop tests.

#![allow(dead_code)]

use std::path::Path;

use bzip2::write::BzEncoder;
use bzip2::Compression;
use mbmirror_packet::packet_file_name;

/// Build a `.tar.bz2` packet archive.
pub fn archive(schema: i64, operations: &str, data: &str) -> Vec<u8> {
    let members = [
        ("SCHEMA_SEQUENCE", format!("{schema}\n")),
        ("TIMESTAMP", "2024-01-01 10:00:00+00\n".to_string()),
        ("mbdump/dbmirror_pending", operations.to_string()),
        ("mbdump/dbmirror_pendingdata", data.to_string()),
    ];
    let mut builder = tar::Builder::new(BzEncoder::new(Vec::new(), Compression::default()));
    for (name, content) in &members {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, name, content.as_bytes())
            .unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

/// Write packet `sequence` into `dir` under its published name.
pub fn publish(dir: &Path, sequence: i64, schema: i64, operations: &str, data: &str) {
    std::fs::write(
        dir.join(packet_file_name(sequence)),
        archive(schema, operations, data),
    )
    .unwrap();
}

/// Insert of artist `id`.
pub fn insert_artist(dir: &Path, sequence: i64, id: &str, name: &str) {
    publish(
        dir,
        sequence,
        27,
        &format!("1\t\"musicbrainz\".\"artist\"\ti\t{sequence}\n"),
        &format!("1\tf\t\"id\"='{id}' \"name\"='{name}' \n"),
    );
}
