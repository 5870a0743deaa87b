//! Synthetic packet archives for source tests.

#![allow(dead_code)]

use bzip2::write::BzEncoder;
use bzip2::Compression;

/// Build a `.tar.bz2` archive holding the given members.
pub fn build_archive(members: &[(&str, &str)]) -> Vec<u8> {
    let mut builder = tar::Builder::new(BzEncoder::new(Vec::new(), Compression::default()));
    for (name, content) in members {
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

/// A packet with one artist insert under schema 27.
pub fn artist_packet() -> Vec<u8> {
    build_archive(&[
        ("SCHEMA_SEQUENCE", "27\n"),
        ("TIMESTAMP", "2024-01-01 10:00:00+00\n"),
        (
            "mbdump/dbmirror_pending",
            "1\t\"musicbrainz\".\"artist\"\ti\t100\n",
        ),
        (
            "mbdump/dbmirror_pendingdata",
            "1\tf\t\"id\"='1' \"name\"='Foo' \n",
        ),
    ])
}
