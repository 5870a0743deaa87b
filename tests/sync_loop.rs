//! Sync loop tests over a directory of packets and an in-memory target.

mod common;

use checkpoint::{FilesystemStore, NullStore, StatusStore, SyncPosition};
use mbmirror::sync::{replay_files, run_sync};
use mbmirror_packet::{packet_file_name, DirectoryPacketSource};
use mbmirror_replication::testing::{MemoryTarget, RecordingHook};
use mbmirror_replication::{NameResolver, NoopHook, ReplayEngine};
use tempfile::TempDir;

fn engine() -> ReplayEngine {
    ReplayEngine::new(NameResolver::default())
}

#[tokio::test]
async fn test_first_fetch_not_found_keeps_position() {
    let packets = TempDir::new().unwrap();
    let state = TempDir::new().unwrap();
    let store = FilesystemStore::new(state.path().join("status.json"));
    let mut target = MemoryTarget::new(SyncPosition::new(27, 10), &["artist"]);

    let summary = run_sync(
        &engine(),
        &DirectoryPacketSource::new(packets.path()),
        &mut target,
        &mut NoopHook,
        &store,
    )
    .await
    .unwrap();

    assert_eq!(summary.packets, 0);
    assert_eq!(summary.end, SyncPosition::new(27, 10));
    assert_eq!(target.position, SyncPosition::new(27, 10));
    assert_eq!(target.commits, 0);

    let report = store.load().await.unwrap().unwrap();
    assert_eq!(report.position(), SyncPosition::new(27, 10));
    assert!(report.last_finished.is_some());
    assert!(report.last_updated.is_none());
}

#[tokio::test]
async fn test_applies_packets_until_exhausted() {
    let packets = TempDir::new().unwrap();
    let state = TempDir::new().unwrap();
    common::insert_artist(packets.path(), 11, "1", "Foo");
    common::insert_artist(packets.path(), 12, "2", "Bar");
    // Not reached: 13 is missing.
    common::insert_artist(packets.path(), 14, "3", "Baz");

    let store = FilesystemStore::new(state.path().join("status.json"));
    let mut target = MemoryTarget::new(SyncPosition::new(27, 10), &["artist"]);
    let mut hook = RecordingHook::default();

    let summary = run_sync(
        &engine(),
        &DirectoryPacketSource::new(packets.path()),
        &mut target,
        &mut hook,
        &store,
    )
    .await
    .unwrap();

    assert_eq!(summary.packets, 2);
    assert_eq!(summary.start, SyncPosition::new(27, 10));
    assert_eq!(summary.end, SyncPosition::new(27, 12));
    assert_eq!(summary.stats.table("musicbrainz.artist").unwrap().inserted, 2);
    assert_eq!(target.position, SyncPosition::new(27, 12));
    assert_eq!(target.rows("artist").len(), 2);

    let begins: Vec<String> = hook
        .events()
        .into_iter()
        .filter(|e| e.starts_with("begin"))
        .collect();
    assert_eq!(begins, vec!["begin 11", "begin 12"]);

    let report = store.load().await.unwrap().unwrap();
    assert_eq!(report.position(), SyncPosition::new(27, 12));
    assert!(report.last_updated.is_some());
    assert!(report.last_finished.is_some());
}

#[tokio::test]
async fn test_schema_mismatch_stops_the_loop() {
    let packets = TempDir::new().unwrap();
    let state = TempDir::new().unwrap();
    common::insert_artist(packets.path(), 11, "1", "Foo");
    common::publish(
        packets.path(),
        12,
        28,
        "1\t\"musicbrainz\".\"artist\"\td\t5\n",
        "1\tt\t\"id\"='1' \n",
    );

    let store = FilesystemStore::new(state.path().join("status.json"));
    let mut target = MemoryTarget::new(SyncPosition::new(27, 10), &["artist"]);

    let err = run_sync(
        &engine(),
        &DirectoryPacketSource::new(packets.path()),
        &mut target,
        &mut NoopHook,
        &store,
    )
    .await
    .unwrap_err();
    assert!(format!("{err:#}").contains("packet 12"));

    // Packet 11 stays applied, 12 left no trace.
    assert_eq!(target.position, SyncPosition::new(27, 11));
    assert_eq!(target.rows("artist").len(), 1);
    let report = store.load().await.unwrap().unwrap();
    assert_eq!(report.position(), SyncPosition::new(27, 11));
    assert!(report.last_finished.is_none());
}

#[tokio::test]
async fn test_corrupt_archive_is_fatal() {
    let packets = TempDir::new().unwrap();
    std::fs::write(packets.path().join(packet_file_name(11)), b"not an archive").unwrap();
    let mut target = MemoryTarget::new(SyncPosition::new(27, 10), &["artist"]);

    let result = run_sync(
        &engine(),
        &DirectoryPacketSource::new(packets.path()),
        &mut target,
        &mut NoopHook,
        &NullStore,
    )
    .await;
    assert!(result.is_err());
    assert_eq!(target.position, SyncPosition::new(27, 10));
}

#[tokio::test]
async fn test_status_report_follows_database() {
    let packets = TempDir::new().unwrap();
    let state = TempDir::new().unwrap();
    let path = state.path().join("status.json");
    std::fs::write(
        &path,
        r#"{"schema_seq": 26, "replication_seq": 3, "last_updated": "2020-01-01 00:00:00", "last_finished": ""}"#,
    )
    .unwrap();
    let store = FilesystemStore::new(&path);
    let mut target = MemoryTarget::new(SyncPosition::new(27, 10), &["artist"]);

    run_sync(
        &engine(),
        &DirectoryPacketSource::new(packets.path()),
        &mut target,
        &mut NoopHook,
        &store,
    )
    .await
    .unwrap();

    let report = store.load().await.unwrap().unwrap();
    assert_eq!(report.position(), SyncPosition::new(27, 10));
    assert_eq!(
        report.last_updated.unwrap().to_string(),
        "2020-01-01 00:00:00"
    );
    assert!(report.last_finished.is_some());
}

#[tokio::test]
async fn test_unreadable_status_report_is_replaced() {
    let packets = TempDir::new().unwrap();
    let state = TempDir::new().unwrap();
    let path = state.path().join("status.json");
    std::fs::write(&path, "{ broken").unwrap();
    let store = FilesystemStore::new(&path);
    let mut target = MemoryTarget::new(SyncPosition::new(27, 10), &["artist"]);

    run_sync(
        &engine(),
        &DirectoryPacketSource::new(packets.path()),
        &mut target,
        &mut NoopHook,
        &store,
    )
    .await
    .unwrap();

    assert_eq!(
        store.load().await.unwrap().unwrap().position(),
        SyncPosition::new(27, 10)
    );
}

#[tokio::test]
async fn test_replay_files_in_order() {
    let dir = TempDir::new().unwrap();
    let first = dir.path().join("a.tar.bz2");
    let second = dir.path().join("b.tar.bz2");
    std::fs::write(
        &first,
        common::archive(
            27,
            "1\t\"musicbrainz\".\"artist\"\ti\t1\n",
            "1\tf\t\"id\"='1' \"name\"='Foo' \n",
        ),
    )
    .unwrap();
    std::fs::write(
        &second,
        common::archive(
            27,
            "1\t\"musicbrainz\".\"artist\"\tu\t2\n",
            "1\tt\t\"id\"='1' \n1\tf\t\"name\"='Renamed' \n",
        ),
    )
    .unwrap();

    let mut target = MemoryTarget::new(SyncPosition::new(27, 10), &["artist"]);
    let summary = replay_files(
        &engine(),
        &[first, second],
        &mut target,
        &mut NoopHook,
        &NullStore,
    )
    .await
    .unwrap();

    assert_eq!(summary.packets, 2);
    assert_eq!(target.position, SyncPosition::new(27, 12));
    let rows = target.rows("artist");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].value("name"), Some("Renamed"));
}
