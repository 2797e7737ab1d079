use std::sync::Arc;

use futures::StreamExt;
use kmon_api::{InProcApi, KmonError, MonitorApi};
use kmon_core::{ChangeRecord, EventType, MonitorConfig};
use kmon_kubehub::{ClusterSource, EventStream};
use kmon_monitor::Engine;

/// A cluster that never changes.
struct IdleSource;

#[async_trait::async_trait]
impl ClusterSource for IdleSource {
    async fn subscribe(&self, _rt: &str, _ns: Option<&str>) -> anyhow::Result<EventStream> {
        Ok(futures::stream::pending().boxed())
    }
    async fn list(&self, _rt: &str, _ns: Option<&str>) -> anyhow::Result<Vec<serde_json::Value>> {
        Ok(Vec::new())
    }
}

fn temp_path(tag: &str) -> std::path::PathBuf {
    let nanos = std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap().as_nanos();
    std::env::temp_dir().join(format!("kmon-api-{}-{}.json", tag, nanos))
}

fn record(id: &str) -> ChangeRecord {
    ChangeRecord {
        id: id.into(),
        timestamp: chrono::Utc::now(),
        event_type: EventType::Modified,
        resource_type: "configmaps".into(),
        namespace: "kube-system".into(),
        name: id.into(),
        details: "Data keys: 2".into(),
        is_read: false,
    }
}

#[tokio::test]
async fn read_state_through_the_facade() {
    let mut cfg = MonitorConfig::default();
    cfg.persistence.enabled = false;
    let engine = Arc::new(Engine::open(cfg, Arc::new(IdleSource)));
    engine.log().append(record("a"));
    engine.log().append(record("b"));
    let api = InProcApi::new(engine);

    assert_eq!(api.list_changes().await.unwrap().len(), 2);
    assert!(api.mark_read("a").await.unwrap());
    assert!(!api.mark_read("zzz").await.unwrap());
    assert_eq!(api.mark_all_read().await.unwrap(), 1);
    assert_eq!(api.mark_all_read().await.unwrap(), 0);
    let stats = api.stats().await.unwrap();
    assert_eq!((stats.total, stats.unread), (2, 0));
    assert_eq!(api.save_now().await, Err(KmonError::Disabled));
    assert!(!api.config().await.unwrap().persistence.enabled);
}

#[tokio::test]
async fn save_now_writes_snapshot() {
    let path = temp_path("save");
    let mut cfg = MonitorConfig::default();
    cfg.persistence.file_path = path.clone();
    let engine = Arc::new(Engine::open(cfg, Arc::new(IdleSource)));
    engine.log().append(record("a"));
    let api = InProcApi::new(engine);

    assert_eq!(api.save_now().await.unwrap(), 1);
    let snap = kmon_persist::read_snapshot(&path).unwrap().unwrap();
    assert_eq!(snap.changes[0].id, "a");
    assert_eq!(snap.changes[0].event_type, EventType::Modified);
    let _ = std::fs::remove_file(&path);
}
