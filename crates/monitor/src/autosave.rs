//! Auto-save scheduler and flush helpers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use kmon_persist::{PersistError, SnapshotStore};
use kmon_store::ChangeLog;
use metrics::counter;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Writes full copies of the log to a store. Flushes are serialized, so an
/// older copy never overwrites a newer one. Background flushes requested
/// while one is already queued are folded into it.
pub struct Flusher {
    store: Arc<dyn SnapshotStore>,
    log: Arc<ChangeLog>,
    gate: Mutex<()>,
    pending: AtomicBool,
}

impl Flusher {
    pub fn new(store: Arc<dyn SnapshotStore>, log: Arc<ChangeLog>) -> Self {
        Self { store, log, gate: Mutex::new(()), pending: AtomicBool::new(false) }
    }

    /// Copy and write under the gate. Blocks on file I/O.
    pub fn flush(&self) -> Result<usize, PersistError> {
        let _g = self.gate.lock().unwrap_or_else(PoisonError::into_inner);
        // cleared before copying: anything appended after this point gets its
        // own background flush
        self.pending.store(false, Ordering::Release);
        let records = self.log.list();
        self.store.save(&records)?;
        Ok(records.len())
    }

    /// Fire-and-forget flush on the blocking pool. Failures are only logged.
    /// No-op while a background flush is queued but has not copied the log yet.
    pub fn spawn(self: &Arc<Self>, trigger: &'static str) {
        if self.pending.swap(true, Ordering::AcqRel) {
            counter!("kmon_persist_flush_coalesced_total", 1u64);
            return;
        }
        let this = Arc::clone(self);
        let job = move || log_flush(this.flush(), trigger);
        match tokio::runtime::Handle::try_current() {
            Ok(rt) => {
                rt.spawn_blocking(job);
            }
            // called outside a runtime (sync callers, tests)
            Err(_) => {
                std::thread::spawn(job);
            }
        }
    }
}

fn log_flush(result: Result<usize, PersistError>, trigger: &'static str) {
    match result {
        Ok(n) => debug!(count = n, trigger, "saved changes"),
        Err(e) => {
            counter!("kmon_persist_save_errors_total", 1u64);
            warn!(error = %e, trigger, "saving changes failed");
        }
    }
}

/// Save every `interval` until `stop` flips to true or its sender is dropped.
/// The final flush on shutdown is the caller's job.
pub fn spawn_autosave(flusher: Arc<Flusher>, interval: Duration, mut stop: watch::Receiver<bool>) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(interval_secs = interval.as_secs_f64(), "auto-save started");
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // first tick fires immediately
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let f = Arc::clone(&flusher);
                    match tokio::task::spawn_blocking(move || f.flush()).await {
                        Ok(res) => log_flush(res, "interval"),
                        Err(e) => warn!(error = %e, "auto-save task panicked"),
                    }
                }
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
            }
        }
        info!("auto-save stopped");
    })
}
