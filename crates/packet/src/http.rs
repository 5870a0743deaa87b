//! HTTP packet source

use std::time::Duration;

use async_trait::async_trait;
use mbmirror_replication::ReplicationPacket;
use reqwest::StatusCode;
use tokio::io::AsyncWriteExt;

use crate::archive::{packet_file_name, read_spooled};
use crate::error::{PacketError, Result};
use crate::PacketSource;

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Fetches `{base_url}/replication-<seq>.tar.bz2`.
///
/// The response body is spooled to an anonymous temporary file before it
/// is decompressed, so a slow or truncated download never leaves a half
/// decoded packet behind.
pub struct HttpPacketSource {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpPacketSource {
    pub fn new(base_url: impl Into<String>, token: Option<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.is_empty()),
        })
    }

    /// URL of packet `sequence`, without the access token.
    pub fn packet_url(&self, sequence: i64) -> String {
        format!("{}/{}", self.base_url, packet_file_name(sequence))
    }
}

#[async_trait]
impl PacketSource for HttpPacketSource {
    async fn fetch(&self, sequence: i64) -> Result<Option<ReplicationPacket>> {
        let url = self.packet_url(sequence);
        let mut request = self.client.get(&url);
        if let Some(token) = &self.token {
            request = request.query(&[("token", token)]);
        }

        let transport = |source| PacketError::Transport {
            url: url.clone(),
            source,
        };
        let mut response = request.send().await.map_err(transport)?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            tracing::debug!("No packet at {url}");
            return Ok(None);
        }
        if !status.is_success() {
            return Err(PacketError::Status {
                url: url.clone(),
                status: status.as_u16(),
            });
        }

        let mut spool = tokio::fs::File::from_std(tempfile::tempfile()?);
        let mut size = 0usize;
        while let Some(chunk) = response.chunk().await.map_err(transport)? {
            size += chunk.len();
            spool.write_all(&chunk).await?;
        }
        spool.flush().await?;
        tracing::info!("Downloaded {url} ({size} bytes)");

        let file = spool.into_std().await;
        read_spooled(sequence, file).await.map(Some)
    }

    fn describe(&self, sequence: i64) -> String {
        self.packet_url(sequence)
    }
}
