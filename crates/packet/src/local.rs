//! Local directory packet source

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use mbmirror_replication::ReplicationPacket;

use crate::archive::{packet_file_name, read_packet_file};
use crate::error::Result;
use crate::PacketSource;

/// Reads `replication-<seq>.tar.bz2` files from a directory.
///
/// A missing file means the packet has not been published yet.
#[derive(Debug, Clone)]
pub struct DirectoryPacketSource {
    dir: PathBuf,
}

impl DirectoryPacketSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn packet_path(&self, sequence: i64) -> PathBuf {
        self.dir.join(packet_file_name(sequence))
    }
}

#[async_trait]
impl PacketSource for DirectoryPacketSource {
    async fn fetch(&self, sequence: i64) -> Result<Option<ReplicationPacket>> {
        let path = self.packet_path(sequence);
        if !tokio::fs::try_exists(&path).await? {
            tracing::debug!("No packet at {}", path.display());
            return Ok(None);
        }
        tracing::info!("Reading {}", path.display());
        read_packet_file(sequence, &path).await.map(Some)
    }

    fn describe(&self, sequence: i64) -> String {
        self.packet_path(sequence).display().to_string()
    }
}
