//! Known-resource index: resource type → `namespace/name` → last seen version.

use std::sync::{PoisonError, RwLock};

use rustc_hash::FxHashMap;

/// Version remembered for an object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KnownVersion {
    /// Reconstructed from a persisted log; the exact version is unknown.
    Loaded,
    /// Last `resourceVersion` observed from the cluster (may be empty).
    Observed(String),
}

impl KnownVersion {
    /// True only for an observed, empty version.
    pub fn is_empty(&self) -> bool {
        matches!(self, KnownVersion::Observed(v) if v.is_empty())
    }
}

/// Entries are never removed; deleted objects stay tracked.
#[derive(Default)]
pub struct KnownIndex {
    inner: RwLock<FxHashMap<String, FxHashMap<String, KnownVersion>>>,
}

impl KnownIndex {
    pub fn new() -> Self { Self::default() }

    /// Record `version` for the object and return what was known before,
    /// as one atomic read-then-write.
    pub fn observe(&self, resource_type: &str, key: &str, version: &str) -> Option<KnownVersion> {
        let mut map = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        map.entry(resource_type.to_string())
            .or_default()
            .insert(key.to_string(), KnownVersion::Observed(version.to_string()))
    }

    /// Mark an object known from a persisted log. Never downgrades an
    /// observed version.
    pub fn mark_loaded(&self, resource_type: &str, key: &str) {
        let mut map = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        map.entry(resource_type.to_string())
            .or_default()
            .entry(key.to_string())
            .or_insert(KnownVersion::Loaded);
    }

    /// Record versions from a listing in one lock acquisition.
    pub fn record_listed<I>(&self, resource_type: &str, items: I) -> usize
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut map = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let per_type = map.entry(resource_type.to_string()).or_default();
        let mut n = 0usize;
        for (key, version) in items {
            per_type.insert(key, KnownVersion::Observed(version));
            n += 1;
        }
        n
    }

    pub fn get(&self, resource_type: &str, key: &str) -> Option<KnownVersion> {
        let map = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        map.get(resource_type).and_then(|m| m.get(key)).cloned()
    }

    /// Number of tracked objects for a resource type.
    pub fn len_for(&self, resource_type: &str) -> usize {
        let map = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        map.get(resource_type).map(|m| m.len()).unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        let map = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        map.values().map(|m| m.len()).sum()
    }

    pub fn is_empty(&self) -> bool { self.len() == 0 }
}
