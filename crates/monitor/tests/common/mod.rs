#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{anyhow, Result};
use futures::StreamExt;
use kmon_core::{EventType, RawEvent};
use kmon_kubehub::{ClusterSource, EventStream};
use serde_json::json;

/// What the next `subscribe` call for a resource returns.
pub enum Script {
    /// Subscribe fails.
    Fail,
    /// Stream yields these events, then ends.
    Events(Vec<RawEvent>),
    /// Stream yields these events, then errors.
    EventsThenError(Vec<RawEvent>),
}

/// Scripted cluster. Once a resource's scripts run out, subscribe returns a
/// stream that never yields.
#[derive(Default)]
pub struct FakeSource {
    scripts: Mutex<HashMap<String, VecDeque<Script>>>,
    listings: Mutex<HashMap<String, Result<Vec<serde_json::Value>, String>>>,
    subscribes: Mutex<HashMap<String, usize>>,
}

impl FakeSource {
    pub fn new() -> Self { Self::default() }

    pub fn script(self, resource: &str, s: Script) -> Self {
        self.scripts.lock().unwrap().entry(resource.to_string()).or_default().push_back(s);
        self
    }

    pub fn listing(self, resource: &str, items: Vec<serde_json::Value>) -> Self {
        self.listings.lock().unwrap().insert(resource.to_string(), Ok(items));
        self
    }

    pub fn failing_listing(self, resource: &str) -> Self {
        self.listings.lock().unwrap().insert(resource.to_string(), Err("forbidden".into()));
        self
    }

    pub fn subscribe_count(&self, resource: &str) -> usize {
        self.subscribes.lock().unwrap().get(resource).copied().unwrap_or(0)
    }
}

#[async_trait::async_trait]
impl ClusterSource for FakeSource {
    async fn subscribe(&self, resource_type: &str, _namespace: Option<&str>) -> Result<EventStream> {
        *self.subscribes.lock().unwrap().entry(resource_type.to_string()).or_default() += 1;
        let next = self.scripts.lock().unwrap().get_mut(resource_type).and_then(|q| q.pop_front());
        match next {
            None => Ok(futures::stream::pending().boxed()),
            Some(Script::Fail) => Err(anyhow!("connection refused")),
            Some(Script::Events(evs)) => Ok(async_stream::stream! {
                for e in evs {
                    yield Ok(e);
                }
            }
            .boxed()),
            Some(Script::EventsThenError(evs)) => Ok(async_stream::stream! {
                for e in evs {
                    yield Ok(e);
                }
                yield Err(anyhow!("stream reset"));
            }
            .boxed()),
        }
    }

    async fn list(&self, resource_type: &str, _namespace: Option<&str>) -> Result<Vec<serde_json::Value>> {
        match self.listings.lock().unwrap().get(resource_type) {
            Some(Ok(items)) => Ok(items.clone()),
            Some(Err(e)) => Err(anyhow!("{}", e)),
            None => Ok(Vec::new()),
        }
    }
}

pub fn pod(ns: &str, name: &str, rv: &str) -> serde_json::Value {
    json!({
        "kind": "Pod",
        "metadata": {"name": name, "namespace": ns, "resourceVersion": rv},
        "status": {"phase": "Running"}
    })
}

pub fn service(ns: &str, name: &str, rv: &str) -> serde_json::Value {
    json!({
        "kind": "Service",
        "metadata": {"name": name, "namespace": ns, "resourceVersion": rv},
        "spec": {"type": "ClusterIP", "ports": [{"port": 80}]}
    })
}

pub fn added(obj: serde_json::Value) -> RawEvent { RawEvent::new(EventType::Added, obj) }
pub fn modified(obj: serde_json::Value) -> RawEvent { RawEvent::new(EventType::Modified, obj) }

pub fn temp_path(tag: &str) -> PathBuf {
    let nanos = std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap().as_nanos();
    std::env::temp_dir().join(format!("kmon-monitor-{}-{}.json", tag, nanos))
}

/// Poll `cond` every 5ms until true or `timeout` passes.
pub async fn wait_until<F: Fn() -> bool>(cond: F, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    cond()
}
