//! Observability status report.

use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::SyncPosition;

/// Timestamp format used in the status file.
pub const STATUS_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Status artifact written for external monitoring.
///
/// # File Format
///
/// ```json
/// {
///     "schema_seq": 27,
///     "replication_seq": 151234,
///     "last_updated": "2024-01-01 10:00:00",
///     "last_finished": "2024-01-01 10:00:05"
/// }
/// ```
///
/// Absent timestamps are written as empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    #[serde(default)]
    pub schema_seq: i64,
    #[serde(default)]
    pub replication_seq: i64,
    #[serde(default, with = "status_time")]
    pub last_updated: Option<NaiveDateTime>,
    #[serde(default, with = "status_time")]
    pub last_finished: Option<NaiveDateTime>,
}

impl StatusReport {
    pub fn new(position: SyncPosition) -> Self {
        Self {
            schema_seq: position.schema_seq,
            replication_seq: position.replication_seq,
            last_updated: None,
            last_finished: None,
        }
    }

    pub fn position(&self) -> SyncPosition {
        SyncPosition::new(self.schema_seq, self.replication_seq)
    }

    /// Record a successfully applied packet.
    pub fn update(&mut self, position: SyncPosition) {
        self.schema_seq = position.schema_seq;
        self.replication_seq = position.replication_seq;
        self.last_updated = Some(now());
    }

    /// Record a clean stop because no newer packet exists.
    pub fn finish(&mut self) {
        self.last_finished = Some(now());
    }
}

fn now() -> NaiveDateTime {
    Local::now().naive_local()
}

mod status_time {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    use super::STATUS_TIME_FORMAT;

    pub fn serialize<S: Serializer>(
        value: &Option<NaiveDateTime>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(time) => serializer.serialize_str(&time.format(STATUS_TIME_FORMAT).to_string()),
            None => serializer.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<NaiveDateTime>, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
        if raw.trim().is_empty() {
            return Ok(None);
        }
        NaiveDateTime::parse_from_str(raw.trim(), STATUS_TIME_FORMAT)
            .map(Some)
            .map_err(serde::de::Error::custom)
    }
}
