//! Packet sync loop.
//!
//! Starting from the position stored in the destination database, packets
//! are fetched and replayed one after another until the source reports that
//! the next packet does not exist yet:
//!
//! ```text
//! fetching -> parsing -> replaying -> advanced -> fetching ...
//!     |                      |
//!     +-> exhausted          +-> failed
//! ```
//!
//! The status report is written after every applied packet and once more on
//! exhaustion. It is never read back to decide where to resume.

use std::fmt;
use std::path::PathBuf;

use anyhow::{Context, Result};
use checkpoint::{StatusReport, StatusStore, SyncPosition};
use mbmirror_packet::{read_packet_file, PacketSource};
use mbmirror_replication::{ReplayEngine, ReplayStats, ReplicationHook, ReplicationTarget};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Fetching,
    Parsing,
    Replaying,
    Advanced,
    Exhausted,
    Failed,
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncState::Fetching => "fetching",
            SyncState::Parsing => "parsing",
            SyncState::Replaying => "replaying",
            SyncState::Advanced => "advanced",
            SyncState::Exhausted => "exhausted",
            SyncState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// What a sync run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSummary {
    pub start: SyncPosition,
    pub end: SyncPosition,
    pub packets: usize,
    pub stats: ReplayStats,
}

impl SyncSummary {
    fn new(start: SyncPosition) -> Self {
        Self {
            start,
            end: start,
            packets: 0,
            stats: ReplayStats::new(),
        }
    }
}

/// Apply packets from `source` until it has no newer one.
pub async fn run_sync<T, H>(
    engine: &ReplayEngine,
    source: &dyn PacketSource,
    target: &mut T,
    hooks: &mut H,
    store: &dyn StatusStore,
) -> Result<SyncSummary>
where
    T: ReplicationTarget + ?Sized,
    H: ReplicationHook + ?Sized,
{
    let mut position = target
        .read_position()
        .await
        .context("Failed to read the replication position")?;
    info!("Database is at {position}");

    let mut report = load_report(store, position).await;
    let mut summary = SyncSummary::new(position);

    loop {
        let sequence = position.next_sequence();
        debug!(state = %SyncState::Fetching, sequence, "Fetching {}", source.describe(sequence));

        let packet = match source.fetch(sequence).await {
            Ok(Some(packet)) => packet,
            Ok(None) => {
                debug!(state = %SyncState::Exhausted, sequence);
                info!(
                    "Packet {sequence} is not available yet, replication is up to date \
                     ({} packets applied)",
                    summary.packets
                );
                report.finish();
                save_report(store, &report).await;
                return Ok(summary);
            }
            Err(e) => {
                debug!(state = %SyncState::Failed, sequence);
                return Err(e).with_context(|| {
                    format!("Failed to fetch packet {}", source.describe(sequence))
                });
            }
        };
        debug!(
            state = %SyncState::Parsing,
            sequence,
            "Decoded {} operations",
            packet.pending.operation_count()
        );

        debug!(state = %SyncState::Replaying, sequence);
        let stats = engine
            .process(&packet, &position, target, hooks)
            .await
            .with_context(|| format!("Failed to replay packet {sequence}"))?;

        position = position.advanced_to(sequence);
        debug!(state = %SyncState::Advanced, sequence);
        report.update(position);
        save_report(store, &report).await;

        summary.end = position;
        summary.packets += 1;
        summary.stats.merge(&stats);
    }
}

/// Apply local packet archives in the given order. Each file is taken to be
/// the packet following the current database position.
pub async fn replay_files<T, H>(
    engine: &ReplayEngine,
    files: &[PathBuf],
    target: &mut T,
    hooks: &mut H,
    store: &dyn StatusStore,
) -> Result<SyncSummary>
where
    T: ReplicationTarget + ?Sized,
    H: ReplicationHook + ?Sized,
{
    let mut position = target
        .read_position()
        .await
        .context("Failed to read the replication position")?;
    let mut report = load_report(store, position).await;
    let mut summary = SyncSummary::new(position);

    for file in files {
        let sequence = position.next_sequence();
        info!("Replaying {} as packet {sequence}", file.display());
        let packet = read_packet_file(sequence, file)
            .await
            .with_context(|| format!("Failed to read packet file {}", file.display()))?;
        let stats = engine
            .process(&packet, &position, target, hooks)
            .await
            .with_context(|| format!("Failed to replay {}", file.display()))?;

        position = position.advanced_to(sequence);
        report.update(position);
        save_report(store, &report).await;

        summary.end = position;
        summary.packets += 1;
        summary.stats.merge(&stats);
    }
    Ok(summary)
}

/// The stored report, with its position replaced by the database's.
async fn load_report(store: &dyn StatusStore, position: SyncPosition) -> StatusReport {
    let mut report = match store.load().await {
        Ok(Some(report)) => report,
        Ok(None) => StatusReport::new(position),
        Err(e) => {
            warn!("Ignoring unreadable status report: {e:#}");
            StatusReport::new(position)
        }
    };
    if report.position() != position {
        info!(
            "Status report says {}, database says {position}; using the database",
            report.position()
        );
        report.schema_seq = position.schema_seq;
        report.replication_seq = position.replication_seq;
    }
    report
}

async fn save_report(store: &dyn StatusStore, report: &StatusReport) {
    if let Err(e) = store.save(report).await {
        warn!("Failed to save status report: {e:#}");
    }
}
