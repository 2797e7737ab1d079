//! kmon persistence: the change log as one JSON document, written wholesale.
//! Keep code tiny and predictable.

#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use kmon_core::ChangeRecord;
use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("io on {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },
    #[error("decoding snapshot {path}: {source}")]
    Decode { path: PathBuf, source: serde_json::Error },
    #[error("encoding snapshot: {0}")]
    Encode(#[source] serde_json::Error),
}

// Decoding twin: records are taken as raw values so one bad entry can be
// skipped without losing the rest.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSnapshot {
    #[serde(default = "Utc::now", deserialize_with = "kmon_core::lenient_timestamp")]
    saved_at: DateTime<Utc>,
    #[serde(default)]
    changes: Vec<serde_json::Value>,
}

fn decode_snapshot(path: &Path, data: &[u8]) -> Result<PersistedSnapshot, PersistError> {
    let raw: RawSnapshot =
        serde_json::from_slice(data).map_err(|source| PersistError::Decode { path: path.to_path_buf(), source })?;
    let total = raw.changes.len();
    let mut changes = Vec::with_capacity(total);
    for (i, v) in raw.changes.into_iter().enumerate() {
        match serde_json::from_value::<ChangeRecord>(v) {
            Ok(rec) => changes.push(rec),
            Err(e) => {
                counter!("kmon_persist_skipped_records_total", 1u64);
                warn!(path = %path.display(), index = i, error = %e, "skipping undecodable change record");
            }
        }
    }
    if changes.len() < total {
        warn!(path = %path.display(), kept = changes.len(), total, "snapshot loaded with skipped records");
    }
    Ok(PersistedSnapshot { saved_at: raw.saved_at, changes })
}

/// On-disk layout: `{ "savedAt": ..., "changes": [...] }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedSnapshot {
    pub saved_at: DateTime<Utc>,
    #[serde(default)]
    pub changes: Vec<ChangeRecord>,
}

pub trait SnapshotStore: Send + Sync {
    /// Overwrite the stored snapshot with `records`.
    fn save(&self, records: &[ChangeRecord]) -> Result<(), PersistError>;
    /// Stored records; empty when nothing was saved yet.
    fn load(&self) -> Result<Vec<ChangeRecord>, PersistError>;
}

/// File-backed store. Every save/load goes through one mutex, so a load never
/// sees a half-written file from this process. There is no atomic rename: a
/// crash mid-write can leave a corrupt file.
pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), lock: Mutex::new(()) }
    }

    pub fn path(&self) -> &Path { &self.path }

    fn io_err(&self, source: std::io::Error) -> PersistError {
        PersistError::Io { path: self.path.clone(), source }
    }
}

impl SnapshotStore for JsonFileStore {
    fn save(&self, records: &[ChangeRecord]) -> Result<(), PersistError> {
        let started = std::time::Instant::now();
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let doc = SnapshotRef { saved_at: Utc::now(), changes: records };
        let data = serde_json::to_vec_pretty(&doc).map_err(PersistError::Encode)?;
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|e| self.io_err(e))?;
        }
        std::fs::write(&self.path, data).map_err(|e| self.io_err(e))?;
        histogram!("kmon_persist_save_ms", started.elapsed().as_secs_f64() * 1000.0);
        counter!("kmon_persist_save_total", 1u64);
        debug!(count = records.len(), path = %self.path.display(), "snapshot saved");
        Ok(())
    }

    fn load(&self) -> Result<Vec<ChangeRecord>, PersistError> {
        let started = std::time::Instant::now();
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let data = match std::fs::read(&self.path) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.io_err(e)),
        };
        let snap = decode_snapshot(&self.path, &data)?;
        histogram!("kmon_persist_load_ms", started.elapsed().as_secs_f64() * 1000.0);
        Ok(snap.changes)
    }
}

// Borrowing twin of `PersistedSnapshot` so saves don't clone the log.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotRef<'a> {
    saved_at: DateTime<Utc>,
    changes: &'a [ChangeRecord],
}

/// Read the full document including `savedAt`. Used by offline tooling.
pub fn read_snapshot(path: &Path) -> Result<Option<PersistedSnapshot>, PersistError> {
    let data = match std::fs::read(path) {
        Ok(d) => d,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => return Err(PersistError::Io { path: path.to_path_buf(), source }),
    };
    decode_snapshot(path, &data).map(Some)
}
