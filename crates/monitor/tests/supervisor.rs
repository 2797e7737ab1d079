mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common::*;
use kmon_core::ResourceConfig;
use kmon_kubehub::ClusterSource;
use kmon_monitor::supervisor::{run_watch, spawn_watchers};
use kmon_monitor::{Reconciler, WatchBackoff};
use kmon_store::{ChangeLog, KnownIndex};

const FAST: WatchBackoff = WatchBackoff { open_retry: Duration::from_millis(10), restart: Duration::from_millis(10) };

fn reconciler() -> Arc<Reconciler> {
    Arc::new(Reconciler::new(Arc::new(ChangeLog::new(Utc::now())), Arc::new(KnownIndex::new())))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn resubscribes_after_stream_ends() {
    let src = Arc::new(
        FakeSource::new()
            .script("pods", Script::Events(vec![added(pod("default", "a", "1"))]))
            .script("pods", Script::Events(vec![added(pod("default", "b", "1"))])),
    );
    let rec = reconciler();
    let task = tokio::spawn(run_watch(src.clone() as Arc<dyn ClusterSource>, rec.clone(), ResourceConfig::new("pods", true), FAST));

    assert!(wait_until(|| rec.log().len() == 2, Duration::from_secs(2)).await);
    assert!(wait_until(|| src.subscribe_count("pods") >= 3, Duration::from_secs(2)).await);
    task.abort();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn retries_after_failed_open() {
    let src = Arc::new(
        FakeSource::new()
            .script("pods", Script::Fail)
            .script("pods", Script::Fail)
            .script("pods", Script::Events(vec![added(pod("default", "a", "1"))])),
    );
    let rec = reconciler();
    let task = tokio::spawn(run_watch(src.clone() as Arc<dyn ClusterSource>, rec.clone(), ResourceConfig::new("pods", true), FAST));

    assert!(wait_until(|| rec.log().len() == 1, Duration::from_secs(2)).await);
    assert!(src.subscribe_count("pods") >= 3);
    task.abort();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stream_error_restarts_and_keeps_prior_events() {
    let src = Arc::new(
        FakeSource::new()
            .script("pods", Script::EventsThenError(vec![added(pod("default", "a", "1"))]))
            .script("pods", Script::Events(vec![modified(pod("default", "a", "2"))])),
    );
    let rec = reconciler();
    let task = tokio::spawn(run_watch(src.clone() as Arc<dyn ClusterSource>, rec.clone(), ResourceConfig::new("pods", true), FAST));

    assert!(wait_until(|| rec.log().len() == 2, Duration::from_secs(2)).await);
    task.abort();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failing_resource_does_not_block_others() {
    let mut src = FakeSource::new();
    for _ in 0..50 {
        src = src.script("services", Script::Fail);
    }
    let src = Arc::new(src.script("pods", Script::Events(vec![added(pod("default", "a", "1"))])));
    let rec = reconciler();
    let handles = spawn_watchers(
        src.clone() as Arc<dyn ClusterSource>,
        rec.clone(),
        vec![ResourceConfig::new("services", true), ResourceConfig::new("pods", true)],
        FAST,
    );
    assert_eq!(handles.len(), 2);

    assert!(wait_until(|| rec.log().len() == 1, Duration::from_secs(2)).await);
    assert!(wait_until(|| src.subscribe_count("services") >= 2, Duration::from_secs(2)).await);
    for h in handles {
        h.abort();
    }
}
