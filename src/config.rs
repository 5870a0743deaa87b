//! Configuration file handling.
//!
//! mbmirror reads a TOML file (default `mbmirror.toml`) and lets a few
//! command-line flags override it:
//!
//! ```toml
//! [database]
//! connection_string = "host=localhost user=musicbrainz dbname=musicbrainz"
//! control_table = "replication_control"
//! source_schema = "musicbrainz"
//!
//! [replication]
//! base_url = "https://metabrainz.org/api/musicbrainz/replication-packets"
//! token = "..."
//! timeout = "60s"
//! durability = "best-effort"
//! on_insert_conflict = "fail"
//! status_file = "/var/lib/mbmirror/status.json"
//!
//! [schemas]
//! mapping = { musicbrainz = "mb", statistics = "<ignore>" }
//! ignore = ["documentation"]
//!
//! [tables]
//! ignore = ["edit_note"]
//!
//! [audit]
//! enabled = true
//! directory = "/var/log/mbmirror"
//!
//! [search]
//! enabled = true
//! url = "http://localhost:8983/solr/musicbrainz"
//! fallback_directory = "/tmp"
//! index = ["artist", "label", "release"]
//! ```

mod duration;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use mbmirror_replication::{
    Durability, InsertConflict, NameMapping, NameResolver, DEFAULT_SOURCE_SCHEMA,
};
use mbmirror_packet::DEFAULT_TIMEOUT;
use mbmirror_postgresql::DEFAULT_CONTROL_TABLE;
use serde::Deserialize;

use crate::hooks::search::EntityKind;

pub use duration::parse_duration_to_secs;

/// Path tried when no `--config` is given.
pub const DEFAULT_CONFIG_PATH: &str = "mbmirror.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub database: DatabaseConfig,
    pub replication: ReplicationConfig,
    pub schemas: SchemasConfig,
    pub tables: TablesConfig,
    pub audit: AuditConfig,
    pub search: SearchConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    pub connection_string: Option<String>,
    pub control_table: String,
    /// Schema of unqualified table references in packets.
    pub source_schema: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            connection_string: None,
            control_table: DEFAULT_CONTROL_TABLE.to_string(),
            source_schema: DEFAULT_SOURCE_SCHEMA.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReplicationConfig {
    /// HTTP base URL, or a local directory holding packet archives.
    pub base_url: Option<String>,
    pub token: Option<String>,
    pub timeout: String,
    pub durability: Durability,
    pub on_insert_conflict: InsertConflict,
    pub status_file: Option<PathBuf>,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            token: None,
            timeout: format!("{}s", DEFAULT_TIMEOUT.as_secs()),
            durability: Durability::default(),
            on_insert_conflict: InsertConflict::default(),
            status_file: None,
        }
    }
}

impl ReplicationConfig {
    pub fn timeout(&self) -> Result<Duration> {
        let secs = parse_duration_to_secs(&self.timeout)
            .with_context(|| format!("Invalid replication timeout '{}'", self.timeout))?;
        if secs <= 0 {
            anyhow::bail!("Replication timeout must be positive, got '{}'", self.timeout);
        }
        Ok(Duration::from_secs(secs as u64))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchemasConfig {
    /// Logical to physical schema names; `<ignore>` drops a schema.
    pub mapping: HashMap<String, String>,
    pub ignore: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TablesConfig {
    pub ignore: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuditConfig {
    pub enabled: bool,
    pub directory: PathBuf,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            directory: PathBuf::from("."),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SearchConfig {
    pub enabled: bool,
    pub url: Option<String>,
    pub fallback_directory: PathBuf,
    pub index: Vec<EntityKind>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: None,
            fallback_directory: std::env::temp_dir(),
            index: EntityKind::ALL.to_vec(),
        }
    }
}

/// Values given on the command line, which win over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub connection_string: Option<String>,
    pub base_url: Option<String>,
    pub token: Option<String>,
    pub status_file: Option<PathBuf>,
    pub durability: Option<Durability>,
}

impl Config {
    /// Load `path`, or [`DEFAULT_CONFIG_PATH`] if it exists, or defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let default = Path::new(DEFAULT_CONFIG_PATH);
                if default.exists() {
                    Self::from_file(default)
                } else {
                    tracing::debug!("No {DEFAULT_CONFIG_PATH}, using defaults");
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn apply(&mut self, overrides: Overrides) {
        if let Some(connection_string) = overrides.connection_string {
            self.database.connection_string = Some(connection_string);
        }
        if let Some(base_url) = overrides.base_url {
            self.replication.base_url = Some(base_url);
        }
        if let Some(token) = overrides.token {
            self.replication.token = Some(token);
        }
        if let Some(status_file) = overrides.status_file {
            self.replication.status_file = Some(status_file);
        }
        if let Some(durability) = overrides.durability {
            self.replication.durability = durability;
        }
    }

    pub fn connection_string(&self) -> Result<&str> {
        self.database.connection_string.as_deref().context(
            "No database connection string; set [database] connection_string, \
             --connection-string or MBMIRROR_CONNECTION_STRING",
        )
    }

    pub fn base_url(&self) -> Result<&str> {
        self.replication.base_url.as_deref().context(
            "No packet source; set [replication] base_url or --base-url",
        )
    }

    /// Physical schema the source schema's tables are replayed into.
    pub fn destination_schema(&self) -> &str {
        let source = self.database.source_schema.as_str();
        self.schemas
            .mapping
            .get(source)
            .map(String::as_str)
            .unwrap_or(source)
    }

    pub fn resolver(&self) -> NameResolver {
        NameResolver::new(
            self.database.source_schema.clone(),
            NameMapping::new(self.schemas.mapping.clone()),
        )
        .with_ignored_schemas(self.schemas.ignore.iter().cloned())
        .with_ignored_tables(self.tables.ignore.iter().cloned())
    }
}
