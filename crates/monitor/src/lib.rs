//! kmon monitor: watch supervision, duplicate suppression and the change log
//! lifecycle.
//!
//! `Engine` owns the shared state (change log + known-resource index) and
//! wires the pieces together:
//! - `open`: load the persisted snapshot and seed the index from it
//! - `start`: seed the index from live listings, then spawn one watch task per
//!   enabled resource plus the auto-save timer
//! - `shutdown`: stop auto-save, abort watchers, flush one last time

#![forbid(unsafe_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use kmon_core::{ChangeRecord, ChangeStats, MonitorConfig};
use kmon_kubehub::ClusterSource;
use kmon_persist::{JsonFileStore, PersistError, SnapshotStore};
use kmon_store::{ChangeLog, KnownIndex};

use crate::autosave::Flusher;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub mod autosave;
pub mod populate;
pub mod reconciler;
pub mod supervisor;

pub use reconciler::{Outcome, Reconciler};
pub use supervisor::WatchBackoff;

#[derive(Debug, thiserror::Error)]
pub enum SaveError {
    #[error("persistence is not enabled")]
    Disabled,
    #[error(transparent)]
    Persist(#[from] PersistError),
}

pub struct Engine {
    config: MonitorConfig,
    source: Arc<dyn ClusterSource>,
    flusher: Option<Arc<Flusher>>,
    log: Arc<ChangeLog>,
    index: Arc<KnownIndex>,
    reconciler: Arc<Reconciler>,
    backoff: WatchBackoff,
    started: AtomicBool,
    stop_tx: watch::Sender<bool>,
    watchers: Mutex<Vec<JoinHandle<()>>>,
    autosave: Mutex<Option<JoinHandle<()>>>,
}

impl Engine {
    /// Build from configuration; uses a JSON file store when persistence is on.
    pub fn open(config: MonitorConfig, source: Arc<dyn ClusterSource>) -> Self {
        let store = config
            .persistence
            .enabled
            .then(|| Arc::new(JsonFileStore::new(config.persistence.file_path.clone())) as Arc<dyn SnapshotStore>);
        Self::with_store(config, source, store)
    }

    /// Build with an explicit store. The store alone decides whether
    /// persistence is on; `persistence.enabled` is only read by `open`.
    pub fn with_store(config: MonitorConfig, source: Arc<dyn ClusterSource>, store: Option<Arc<dyn SnapshotStore>>) -> Self {
        let log = Arc::new(ChangeLog::new(Utc::now()));
        let index = Arc::new(KnownIndex::new());

        if let Some(store) = &store {
            match store.load() {
                Ok(mut records) => {
                    let fresh = records.is_empty();
                    // records saved without an id still need one for mark_read
                    for r in records.iter_mut().filter(|r| r.id.is_empty()) {
                        r.id = reconciler::new_change_id();
                    }
                    info!(count = records.len(), "loaded changes from snapshot");
                    log.restore(records);
                    populate::populate_from_log(&index, &log.list());
                    // create the file on first run
                    if fresh {
                        if let Err(e) = store.save(&[]) {
                            warn!(error = %e, "could not create initial snapshot");
                        }
                    }
                }
                // keep the unreadable file untouched; start empty
                Err(e) => warn!(error = %e, "could not load changes; starting with an empty log"),
            }
        }

        let flusher = store.map(|s| Arc::new(Flusher::new(s, Arc::clone(&log))));
        let mut reconciler = Reconciler::new(Arc::clone(&log), Arc::clone(&index));
        // no auto-save: every accepted event is flushed in the background
        if let (Some(f), false) = (&flusher, config.persistence.auto_save) {
            reconciler = reconciler.with_flush(Arc::clone(f));
        }
        let (stop_tx, _) = watch::channel(false);
        Self {
            config,
            source,
            flusher,
            log,
            index,
            reconciler: Arc::new(reconciler),
            backoff: WatchBackoff::default(),
            started: AtomicBool::new(false),
            stop_tx,
            watchers: Mutex::new(Vec::new()),
            autosave: Mutex::new(None),
        }
    }

    pub fn with_backoff(mut self, backoff: WatchBackoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Populate the index from live listings, then start watching. Listing
    /// completes before any watch delivers events. Calling twice is a no-op.
    pub async fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            warn!("engine already started");
            return;
        }
        let resources = self.config.enabled_resources();
        populate::populate_from_listing(self.source.as_ref(), &self.index, &resources).await;

        let count = resources.len();
        let handles = supervisor::spawn_watchers(Arc::clone(&self.source), Arc::clone(&self.reconciler), resources, self.backoff);
        self.watchers.lock().unwrap_or_else(PoisonError::into_inner).extend(handles);

        if let (Some(f), true) = (&self.flusher, self.config.persistence.auto_save) {
            let handle = autosave::spawn_autosave(Arc::clone(f), self.config.persistence.interval(), self.stop_tx.subscribe());
            *self.autosave.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        }
        info!(resources = count, "started monitoring");
    }

    /// Stop auto-save and watchers, then flush once synchronously.
    pub async fn shutdown(&self) {
        self.stop_tx.send_replace(true);
        let autosave = self.autosave.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(h) = autosave {
            let _ = h.await;
        }
        let watchers: Vec<JoinHandle<()>> = std::mem::take(&mut *self.watchers.lock().unwrap_or_else(PoisonError::into_inner));
        for h in watchers {
            h.abort();
        }
        if let Some(f) = self.flusher.clone() {
            match tokio::task::spawn_blocking(move || f.flush()).await {
                Ok(Ok(n)) => info!(count = n, "final save completed"),
                Ok(Err(e)) => warn!(error = %e, "final save failed"),
                Err(e) => warn!(error = %e, "final save task panicked"),
            }
        }
    }

    pub fn config(&self) -> &MonitorConfig { &self.config }
    pub fn log(&self) -> &Arc<ChangeLog> { &self.log }
    pub fn index(&self) -> &Arc<KnownIndex> { &self.index }
    pub fn reconciler(&self) -> &Arc<Reconciler> { &self.reconciler }

    pub fn persistence_enabled(&self) -> bool { self.flusher.is_some() }

    pub fn list_changes(&self) -> Vec<ChangeRecord> { self.log.list() }
    pub fn stats(&self) -> ChangeStats { self.log.stats() }
    pub fn mark_read(&self, id: &str) -> bool { self.log.mark_read(id) }
    pub fn mark_all_read(&self) -> usize { self.log.mark_all_read() }

    /// Save right now, blocking on file I/O. Returns records written.
    pub fn save_now(&self) -> Result<usize, SaveError> {
        let n = self.flusher.as_ref().ok_or(SaveError::Disabled)?.flush()?;
        info!(count = n, "manual save completed");
        Ok(n)
    }
}
