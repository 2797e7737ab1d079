//! kmon core types: change records, raw watch events and stats.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

pub mod config;
pub mod kinds;

pub use config::{ConfigError, MonitorConfig, PersistenceConfig, ResourceConfig};
pub use kinds::{classify, identity, Classified, ObjectIdentity, ResourceKind};

/// Maximum number of change records kept in memory.
pub const CHANGE_LOG_CAP: usize = 1000;

/// Kind of observed transition. Encoded upper-case on the wire.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventType {
    Added,
    Modified,
    Deleted,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Added => "ADDED",
            EventType::Modified => "MODIFIED",
            EventType::Deleted => "DELETED",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One observed transition of a cluster object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRecord {
    #[serde(default)]
    pub id: String,
    /// Missing or unparseable timestamps decode as the current time.
    #[serde(default = "Utc::now", deserialize_with = "lenient_timestamp")]
    pub timestamp: DateTime<Utc>,
    pub event_type: EventType,
    #[serde(default)]
    pub resource_type: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub details: String,
    #[serde(default)]
    pub is_read: bool,
}

impl ChangeRecord {
    /// `namespace/name`, the key used by the known-resource index.
    pub fn object_key(&self) -> String {
        object_key(&self.namespace, &self.name)
    }
}

/// RFC3339 string, or the current time for anything else (empty, garbage,
/// null, non-string).
pub fn lenient_timestamp<'de, D>(de: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = serde_json::Value::deserialize(de)?;
    let parsed = raw
        .as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc));
    Ok(parsed.unwrap_or_else(Utc::now))
}

pub fn object_key(namespace: &str, name: &str) -> String {
    format!("{}/{}", namespace, name)
}

/// Raw notification delivered by a watch stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEvent {
    pub kind: EventType,
    /// Full object as JSON (typed kinds are decoded lazily by `kinds`).
    pub object: serde_json::Value,
}

impl RawEvent {
    pub fn new(kind: EventType, object: serde_json::Value) -> Self {
        Self { kind, object }
    }
}

/// Aggregate view over the change log, computed in a single pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ChangeStats {
    pub total: usize,
    pub unread: usize,
    /// Records whose timestamp predates the engine start (best effort).
    pub loaded_before_start: usize,
    pub current_session: usize,
    pub event_type_counts: BTreeMap<EventType, usize>,
    pub resource_type_counts: BTreeMap<String, usize>,
    pub start_time: Option<DateTime<Utc>>,
    pub uptime_secs: u64,
}

pub mod prelude {
    pub use super::{object_key, ChangeRecord, ChangeStats, EventType, RawEvent, CHANGE_LOG_CAP};
    pub use super::kinds::{classify, identity, Classified, ObjectIdentity, ResourceKind};
}
