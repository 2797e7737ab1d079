//! Resource watch supervisor: one never-ending watch loop per resource type.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use kmon_core::ResourceConfig;
use kmon_kubehub::ClusterSource;
use metrics::counter;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::reconciler::Reconciler;

/// Fixed retry delays. They never grow and the loop never gives up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchBackoff {
    /// Wait after a failed subscribe.
    pub open_retry: Duration,
    /// Wait after an open stream ended or errored.
    pub restart: Duration,
}

impl Default for WatchBackoff {
    fn default() -> Self {
        Self { open_retry: Duration::from_secs(5), restart: Duration::from_secs(1) }
    }
}

/// Keep one subscription for `resource` open forever. Events are reconciled in
/// delivery order.
pub async fn run_watch(
    source: Arc<dyn ClusterSource>,
    reconciler: Arc<Reconciler>,
    resource: ResourceConfig,
    backoff: WatchBackoff,
) {
    let rt = resource.name.clone();
    let ns = resource.namespace().map(|s| s.to_string());
    info!(resource = %rt, ns = %ns.as_deref().unwrap_or("(all)"), "starting watcher");
    loop {
        let mut stream = match source.subscribe(&rt, ns.as_deref()).await {
            Ok(s) => s,
            Err(e) => {
                counter!("kmon_watch_open_errors_total", 1u64, "resource" => rt.clone());
                warn!(resource = %rt, error = %e, "error opening watch; retrying");
                tokio::time::sleep(backoff.open_retry).await;
                continue;
            }
        };
        let mut seen = 0u64;
        while let Some(item) = stream.next().await {
            match item {
                Ok(ev) => {
                    reconciler.handle(&rt, ev);
                    seen += 1;
                }
                Err(e) => {
                    warn!(resource = %rt, error = %e, "watch stream error");
                    break;
                }
            }
        }
        counter!("kmon_watch_restarts_total", 1u64, "resource" => rt.clone());
        info!(resource = %rt, events = seen, "watcher closed, restarting");
        tokio::time::sleep(backoff.restart).await;
    }
}

/// Spawn an independent task per resource.
pub fn spawn_watchers(
    source: Arc<dyn ClusterSource>,
    reconciler: Arc<Reconciler>,
    resources: Vec<ResourceConfig>,
    backoff: WatchBackoff,
) -> Vec<JoinHandle<()>> {
    resources
        .into_iter()
        .map(|r| tokio::spawn(run_watch(Arc::clone(&source), Arc::clone(&reconciler), r, backoff)))
        .collect()
}
