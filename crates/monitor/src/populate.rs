//! Startup population of the known-resource index.

use kmon_core::{identity, object_key, ChangeRecord, ResourceConfig};
use kmon_kubehub::ClusterSource;
use kmon_store::KnownIndex;
use tracing::{info, warn};

/// Mark every object seen in a persisted log as known (version unknown).
pub fn populate_from_log(index: &KnownIndex, records: &[ChangeRecord]) -> usize {
    for r in records {
        index.mark_loaded(&r.resource_type, &r.object_key());
    }
    info!(count = records.len(), "populated known resources from loaded changes");
    records.len()
}

/// Record the current version of every listed object. A failed listing is
/// logged and skipped; the others still run. Returns objects recorded.
pub async fn populate_from_listing(source: &dyn ClusterSource, index: &KnownIndex, resources: &[ResourceConfig]) -> usize {
    let listings = futures::future::join_all(
        resources.iter().map(|r| async move { (r, source.list(&r.name, r.namespace()).await) }),
    )
    .await;
    let mut total = 0usize;
    for (r, res) in listings {
        match res {
            Ok(items) => {
                let entries = items.iter().filter_map(identity).map(|id| {
                    (object_key(&id.namespace, &id.name), id.resource_version)
                });
                let n = index.record_listed(&r.name, entries);
                info!(resource = %r.name, count = n, "populated existing objects");
                total += n;
            }
            Err(e) => warn!(resource = %r.name, error = %e, "could not list current objects"),
        }
    }
    total
}
