//! kmon store: bounded change log and known-resource index.
//!
//! Both structures are guarded by their own `RwLock`. Callers never hold both
//! at once; every accessor takes and releases its lock internally.

#![forbid(unsafe_code)]

use std::collections::{BTreeMap, VecDeque};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use kmon_core::{ChangeRecord, ChangeStats, CHANGE_LOG_CAP};
use metrics::gauge;
use tracing::{debug, info};

mod known;

pub use known::{KnownIndex, KnownVersion};

/// Ordered, bounded log of change records (newest last).
///
/// On overflow the oldest records are evicted first; order is never changed.
pub struct ChangeLog {
    inner: RwLock<VecDeque<ChangeRecord>>,
    cap: usize,
    started_at: DateTime<Utc>,
}

impl ChangeLog {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self::with_capacity(CHANGE_LOG_CAP, started_at)
    }

    pub fn with_capacity(cap: usize, started_at: DateTime<Utc>) -> Self {
        let cap = cap.max(1);
        Self { inner: RwLock::new(VecDeque::with_capacity(cap)), cap, started_at }
    }

    pub fn cap(&self) -> usize { self.cap }
    pub fn started_at(&self) -> DateTime<Utc> { self.started_at }

    fn read(&self) -> RwLockReadGuard<'_, VecDeque<ChangeRecord>> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, VecDeque<ChangeRecord>> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a record, evicting from the front past the cap.
    pub fn append(&self, rec: ChangeRecord) {
        let len = {
            let mut log = self.write();
            if log.len() >= self.cap {
                log.pop_front();
            }
            log.push_back(rec);
            log.len()
        };
        gauge!("kmon_changelog_len", len as f64);
    }

    /// Replace the whole content, keeping only the newest `cap` records.
    pub fn restore(&self, records: Vec<ChangeRecord>) {
        let skip = records.len().saturating_sub(self.cap);
        if skip > 0 {
            debug!(skip, "restored log exceeds cap; dropping oldest");
        }
        let len = {
            let mut log = self.write();
            log.clear();
            log.extend(records.into_iter().skip(skip));
            log.len()
        };
        gauge!("kmon_changelog_len", len as f64);
    }

    pub fn len(&self) -> usize { self.read().len() }
    pub fn is_empty(&self) -> bool { self.read().is_empty() }

    /// Independent copy of the log in insertion order.
    pub fn list(&self) -> Vec<ChangeRecord> {
        self.read().iter().cloned().collect()
    }

    /// Mark a single record read. Returns whether the id was found.
    pub fn mark_read(&self, id: &str) -> bool {
        let mut log = self.write();
        match log.iter_mut().find(|r| r.id == id) {
            Some(r) => {
                r.is_read = true;
                true
            }
            None => false,
        }
    }

    /// Mark every unread record read. Returns how many changed.
    pub fn mark_all_read(&self) -> usize {
        let count = {
            let mut log = self.write();
            let mut count = 0usize;
            for r in log.iter_mut().filter(|r| !r.is_read) {
                r.is_read = true;
                count += 1;
            }
            count
        };
        info!(count, "marked changes as read");
        count
    }

    /// Aggregate counters in a single pass over the log.
    pub fn stats(&self) -> ChangeStats {
        let now = Utc::now();
        let log = self.read();
        let mut unread = 0usize;
        let mut loaded = 0usize;
        let mut by_event = BTreeMap::new();
        let mut by_resource: BTreeMap<String, usize> = BTreeMap::new();
        for r in log.iter() {
            if !r.is_read { unread += 1; }
            if r.timestamp < self.started_at { loaded += 1; }
            *by_event.entry(r.event_type).or_insert(0usize) += 1;
            *by_resource.entry(r.resource_type.clone()).or_insert(0) += 1;
        }
        ChangeStats {
            total: log.len(),
            unread,
            loaded_before_start: loaded,
            current_session: log.len() - loaded,
            event_type_counts: by_event,
            resource_type_counts: by_resource,
            start_time: Some(self.started_at),
            uptime_secs: (now - self.started_at).num_seconds().max(0) as u64,
        }
    }
}
