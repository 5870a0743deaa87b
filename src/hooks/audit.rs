//! Per-packet audit log.
//!
//! Every change about to be applied is appended to a temporary file as
//! `kind;schema.table;{json}`. The file only gets its final name once the
//! packet has committed, so a crash never leaves a log describing changes
//! that were rolled back.

use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Local;
use mbmirror_replication::{Fields, ReplicationHook, TableName};
use tempfile::NamedTempFile;

struct OpenLog {
    writer: BufWriter<NamedTempFile>,
    final_path: PathBuf,
}

pub struct AuditHook {
    directory: PathBuf,
    log: Option<OpenLog>,
}

impl AuditHook {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            log: None,
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn write(&mut self, kind: &str, table: &TableName, fields: &Fields) -> Result<()> {
        let log = self
            .log
            .as_mut()
            .context("Audit log written before begin")?;
        writeln!(log.writer, "{kind};{table};{}", fields_json(fields))?;
        Ok(())
    }
}

/// JSON object of a row's columns, NULL as `null`.
pub fn fields_json(fields: &Fields) -> serde_json::Value {
    let map = fields
        .iter()
        .map(|(column, value)| {
            let value = match value {
                Some(v) => serde_json::Value::String(v.to_string()),
                None => serde_json::Value::Null,
            };
            (column.to_string(), value)
        })
        .collect();
    serde_json::Value::Object(map)
}

#[async_trait]
impl ReplicationHook for AuditHook {
    async fn begin(&mut self, sequence: i64) -> Result<()> {
        std::fs::create_dir_all(&self.directory).with_context(|| {
            format!("Failed to create audit directory {}", self.directory.display())
        })?;
        let file = NamedTempFile::new_in(&self.directory)?;
        let stamp = Local::now().format("%Y%m%d-%H%M%S");
        let final_path = self
            .directory
            .join(format!("mbmirror-{stamp}-{sequence}.log"));
        // Replaces (and thereby deletes) the log of a packet that never committed.
        self.log = Some(OpenLog {
            writer: BufWriter::new(file),
            final_path,
        });
        Ok(())
    }

    async fn before_insert(&mut self, table: &TableName, values: &Fields) -> Result<()> {
        self.write("insert", table, values)
    }

    async fn before_update(&mut self, table: &TableName, _keys: &Fields, values: &Fields) -> Result<()> {
        self.write("update", table, values)
    }

    async fn before_delete(&mut self, table: &TableName, keys: &Fields) -> Result<()> {
        self.write("delete", table, keys)
    }

    async fn after_commit(&mut self) -> Result<()> {
        let Some(log) = self.log.take() else {
            return Ok(());
        };
        let file = log
            .writer
            .into_inner()
            .map_err(|e| anyhow::anyhow!("Failed to flush audit log: {}", e.error()))?;
        file.persist(&log.final_path).with_context(|| {
            format!("Failed to rename audit log to {}", log.final_path.display())
        })?;
        tracing::info!("Audit log written to {}", log.final_path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn artist() -> TableName {
        TableName::new("musicbrainz", "artist")
    }

    fn fields(pairs: &[(&str, Option<&str>)]) -> Fields {
        pairs
            .iter()
            .map(|(k, v)| (*k, v.map(str::to_string)))
            .collect()
    }

    fn files(dir: &Path) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        files.sort();
        files
    }

    #[tokio::test]
    async fn test_log_renamed_on_commit() {
        let tmp = TempDir::new().unwrap();
        let mut hook = AuditHook::new(tmp.path());

        hook.begin(42).await.unwrap();
        hook.before_insert(&artist(), &fields(&[("id", Some("1")), ("comment", None)]))
            .await
            .unwrap();
        hook.before_delete(&artist(), &fields(&[("id", Some("2"))]))
            .await
            .unwrap();
        hook.before_commit().await.unwrap();
        hook.after_commit().await.unwrap();

        let files = files(tmp.path());
        assert_eq!(files.len(), 1);
        let name = files[0].file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("mbmirror-") && name.ends_with("-42.log"));

        let content = std::fs::read_to_string(&files[0]).unwrap();
        assert_eq!(
            content,
            "insert;musicbrainz.artist;{\"comment\":null,\"id\":\"1\"}\n\
             delete;musicbrainz.artist;{\"id\":\"2\"}\n"
        );
    }

    #[tokio::test]
    async fn test_uncommitted_log_is_discarded() {
        let tmp = TempDir::new().unwrap();
        let mut hook = AuditHook::new(tmp.path());

        hook.begin(1).await.unwrap();
        hook.before_update(&artist(), &fields(&[("id", Some("1"))]), &fields(&[("name", Some("x"))]))
            .await
            .unwrap();
        // The packet failed; the next one starts a fresh log.
        hook.begin(1).await.unwrap();
        assert_eq!(files(tmp.path()).len(), 1);
        drop(hook);
        assert!(files(tmp.path()).is_empty());
    }

    #[tokio::test]
    async fn test_write_before_begin_fails() {
        let tmp = TempDir::new().unwrap();
        let mut hook = AuditHook::new(tmp.path());
        assert!(hook.before_insert(&artist(), &Fields::new()).await.is_err());
    }
}
