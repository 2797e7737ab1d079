//! Event reconciler: raw watch event → change record, or suppression.

use std::sync::Arc;

use chrono::Utc;
use kmon_core::{classify, object_key, ChangeRecord, EventType, RawEvent};
use kmon_store::{ChangeLog, KnownIndex, KnownVersion};
use metrics::counter;
use tracing::{debug, info};
use uuid::Uuid;

use crate::autosave::Flusher;

/// What happened to one raw event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Accepted(ChangeRecord),
    /// Added for an object that was already known: replay artifact.
    Suppressed,
    /// No identity could be extracted.
    Dropped,
}

/// An Added event for an object already known with a non-empty version is a
/// replay. Modified and Deleted are never suppressed, even when replayed.
pub fn is_replay(kind: EventType, prior: Option<&KnownVersion>) -> bool {
    kind == EventType::Added && prior.map(|v| !v.is_empty()).unwrap_or(false)
}

pub fn new_change_id() -> String {
    Uuid::new_v4().simple().to_string()
}

pub struct Reconciler {
    log: Arc<ChangeLog>,
    index: Arc<KnownIndex>,
    /// Set when every accepted event should be persisted right away.
    flusher: Option<Arc<Flusher>>,
}

impl Reconciler {
    pub fn new(log: Arc<ChangeLog>, index: Arc<KnownIndex>) -> Self {
        Self { log, index, flusher: None }
    }

    pub fn with_flush(mut self, flusher: Arc<Flusher>) -> Self {
        self.flusher = Some(flusher);
        self
    }

    pub fn log(&self) -> &Arc<ChangeLog> { &self.log }

    pub fn handle(&self, resource_type: &str, ev: RawEvent) -> Outcome {
        let Some(c) = classify(resource_type, &ev.object) else {
            counter!("kmon_events_dropped_total", 1u64);
            debug!(resource = %resource_type, kind = %ev.kind, "dropping event without identity");
            return Outcome::Dropped;
        };
        let key = object_key(&c.identity.namespace, &c.identity.name);
        // read-then-write under a single index lock
        let prior = self.index.observe(resource_type, &key, &c.identity.resource_version);
        if is_replay(ev.kind, prior.as_ref()) {
            counter!("kmon_events_suppressed_total", 1u64);
            debug!(resource = %resource_type, key = %key, "skipping duplicate ADDED for known object");
            return Outcome::Suppressed;
        }

        let rec = ChangeRecord {
            id: new_change_id(),
            timestamp: Utc::now(),
            event_type: ev.kind,
            resource_type: resource_type.to_string(),
            namespace: c.identity.namespace,
            name: c.identity.name,
            details: c.details,
            is_read: false,
        };
        self.log.append(rec.clone());
        counter!("kmon_events_accepted_total", 1u64);
        info!(
            event = %rec.event_type,
            resource = %rec.resource_type,
            name = %rec.name,
            ns = %rec.namespace,
            "change detected"
        );

        if let Some(f) = &self.flusher {
            f.spawn("event");
        }
        Outcome::Accepted(rec)
    }
}
