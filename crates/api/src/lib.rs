//! kmon public API façade (in-process).
//!
//! Frontends (the CLI today) talk to a running engine through `MonitorApi`
//! rather than through the engine's internals.

#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::Instant;

use kmon_core::{ChangeRecord, ChangeStats, MonitorConfig};
use kmon_monitor::{Engine, SaveError};
use serde::{Deserialize, Serialize};
use tracing::info;

/// API errors suitable for transport over RPC later.
#[derive(Debug, thiserror::Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum KmonError {
    #[error("persistence disabled")]
    Disabled,
    #[error("persist: {0}")]
    Persist(String),
    #[error("internal: {0}")]
    Internal(String),
}

pub type KmonResult<T> = Result<T, KmonError>;

impl From<SaveError> for KmonError {
    fn from(e: SaveError) -> Self {
        match e {
            SaveError::Disabled => KmonError::Disabled,
            SaveError::Persist(p) => KmonError::Persist(p.to_string()),
        }
    }
}

#[async_trait::async_trait]
pub trait MonitorApi: Send + Sync {
    /// All retained changes, oldest first.
    async fn list_changes(&self) -> KmonResult<Vec<ChangeRecord>>;

    async fn stats(&self) -> KmonResult<ChangeStats>;

    /// False when no record has `id`.
    async fn mark_read(&self, id: &str) -> KmonResult<bool>;

    /// Number of records that flipped to read.
    async fn mark_all_read(&self) -> KmonResult<usize>;

    /// Persist now; returns the number of records written.
    async fn save_now(&self) -> KmonResult<usize>;

    async fn config(&self) -> KmonResult<MonitorConfig>;
}

/// Calls the engine directly.
pub struct InProcApi {
    engine: Arc<Engine>,
}

impl InProcApi {
    pub fn new(engine: Arc<Engine>) -> Self { Self { engine } }

    pub fn engine(&self) -> &Arc<Engine> { &self.engine }
}

#[async_trait::async_trait]
impl MonitorApi for InProcApi {
    async fn list_changes(&self) -> KmonResult<Vec<ChangeRecord>> { Ok(self.engine.list_changes()) }

    async fn stats(&self) -> KmonResult<ChangeStats> { Ok(self.engine.stats()) }

    async fn mark_read(&self, id: &str) -> KmonResult<bool> { Ok(self.engine.mark_read(id)) }

    async fn mark_all_read(&self) -> KmonResult<usize> { Ok(self.engine.mark_all_read()) }

    async fn save_now(&self) -> KmonResult<usize> {
        let t0 = Instant::now();
        let engine = Arc::clone(&self.engine);
        let n = tokio::task::spawn_blocking(move || engine.save_now())
            .await
            .map_err(|e| KmonError::Internal(e.to_string()))??;
        info!(count = n, took_ms = %t0.elapsed().as_millis(), "api: save_now ok");
        Ok(n)
    }

    async fn config(&self) -> KmonResult<MonitorConfig> { Ok(self.engine.config().clone()) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_errors_map_to_transport_errors() {
        assert_eq!(KmonError::from(SaveError::Disabled), KmonError::Disabled);
        let e = kmon_persist::PersistError::Io {
            path: "/nope/changes.json".into(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(matches!(KmonError::from(SaveError::Persist(e)), KmonError::Persist(msg) if msg.contains("denied")));
    }

    #[test]
    fn error_serializes_by_variant() {
        let s = serde_json::to_string(&KmonError::Disabled).unwrap();
        assert_eq!(s, "\"Disabled\"");
        let back: KmonError = serde_json::from_str(&s).unwrap();
        assert_eq!(back, KmonError::Disabled);
    }
}
