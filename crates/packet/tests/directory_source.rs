//! Directory packet source tests.

mod common;

use mbmirror_packet::{packet_file_name, read_packet_file, DirectoryPacketSource, PacketSource};
use tempfile::TempDir;

#[tokio::test]
async fn test_directory_fetch_and_exhaustion() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join(packet_file_name(11)), common::artist_packet()).unwrap();

    let source = DirectoryPacketSource::new(tmp.path());
    let packet = source.fetch(11).await.unwrap().unwrap();
    assert_eq!(packet.schema_sequence, Some(27));
    assert_eq!(packet.timestamp.as_deref(), Some("2024-01-01 10:00:00+00"));

    assert!(source.fetch(12).await.unwrap().is_none());
}

#[tokio::test]
async fn test_read_packet_file_legacy_names() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("old.tar.bz2");
    let bytes = common::build_archive(&[
        ("SCHEMA_SEQUENCE", "3"),
        ("mbdump/Pending", "7\t\"musicbrainz\".\"label\"\td\t1\n"),
        ("mbdump/PendingData", "7\tt\t\"id\"='2' \n"),
    ]);
    std::fs::write(&path, bytes).unwrap();

    let packet = read_packet_file(40, &path).await.unwrap();
    assert_eq!(packet.sequence, 40);
    assert_eq!(packet.pending.keys(7).value("id"), Some("2"));
}
