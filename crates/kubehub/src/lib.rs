//! kmon kubehub – list and watch wiring for the supported resource kinds

#![forbid(unsafe_code)]

use anyhow::{anyhow, Context, Result};
use futures::{stream::BoxStream, StreamExt};
use k8s_openapi::api::{
    apps::v1::{DaemonSet, Deployment, ReplicaSet, StatefulSet},
    batch::v1::{CronJob, Job},
    core::v1::{ConfigMap, PersistentVolume, PersistentVolumeClaim, Pod, Secret, Service},
    networking::v1::{Ingress, NetworkPolicy},
};
use kmon_core::{EventType, RawEvent, ResourceKind};
use kube::{
    api::{Api, ListParams, WatchEvent, WatchParams},
    core::{ApiResource, DynamicObject},
    Client,
};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

/// Stream of raw events for one subscription. Ends (possibly with an error)
/// when the underlying watch closes.
pub type EventStream = BoxStream<'static, Result<RawEvent>>;

/// Cluster access needed by the monitor.
#[async_trait::async_trait]
pub trait ClusterSource: Send + Sync {
    /// Open a watch starting from the current state (no historical replay).
    async fn subscribe(&self, resource_type: &str, namespace: Option<&str>) -> Result<EventStream>;

    /// List objects currently present.
    async fn list(&self, resource_type: &str, namespace: Option<&str>) -> Result<Vec<serde_json::Value>>;
}

/// Map a supported kind to its API resource description.
pub fn api_resource_for(kind: ResourceKind) -> ApiResource {
    match kind {
        ResourceKind::Pod => ApiResource::erase::<Pod>(&()),
        ResourceKind::Deployment => ApiResource::erase::<Deployment>(&()),
        ResourceKind::ReplicaSet => ApiResource::erase::<ReplicaSet>(&()),
        ResourceKind::DaemonSet => ApiResource::erase::<DaemonSet>(&()),
        ResourceKind::StatefulSet => ApiResource::erase::<StatefulSet>(&()),
        ResourceKind::Service => ApiResource::erase::<Service>(&()),
        ResourceKind::ConfigMap => ApiResource::erase::<ConfigMap>(&()),
        ResourceKind::Secret => ApiResource::erase::<Secret>(&()),
        ResourceKind::Job => ApiResource::erase::<Job>(&()),
        ResourceKind::CronJob => ApiResource::erase::<CronJob>(&()),
        ResourceKind::PersistentVolume => ApiResource::erase::<PersistentVolume>(&()),
        ResourceKind::PersistentVolumeClaim => ApiResource::erase::<PersistentVolumeClaim>(&()),
        ResourceKind::Ingress => ApiResource::erase::<Ingress>(&()),
        ResourceKind::NetworkPolicy => ApiResource::erase::<NetworkPolicy>(&()),
    }
}

fn strip_managed_fields(v: &mut serde_json::Value) {
    if let Some(meta) = v.get_mut("metadata") {
        if let Some(obj) = meta.as_object_mut() {
            obj.remove("managedFields");
        }
    }
}

fn to_json(obj: &DynamicObject) -> Result<serde_json::Value> {
    let mut raw = serde_json::to_value(obj).context("serializing DynamicObject")?;
    strip_managed_fields(&mut raw);
    Ok(raw)
}

fn raw_event(kind: EventType, obj: &DynamicObject) -> Result<RawEvent> {
    Ok(RawEvent::new(kind, to_json(obj)?))
}

const EVENT_QUEUE_CAP: usize = 256;

fn map_watch_event(ev: WatchEvent<DynamicObject>) -> Option<Result<RawEvent>> {
    match ev {
        WatchEvent::Added(o) => Some(raw_event(EventType::Added, &o)),
        WatchEvent::Modified(o) => Some(raw_event(EventType::Modified, &o)),
        WatchEvent::Deleted(o) => Some(raw_event(EventType::Deleted, &o)),
        WatchEvent::Bookmark(_) => None,
        WatchEvent::Error(e) => Some(Err(anyhow!("watch error {} ({}): {}", e.code, e.reason, e.message))),
    }
}

/// Owns the watch for one subscription and forwards mapped events. Reports
/// the open result on `open_tx`. Exits after the first error, when the server
/// closes the watch, or once the receiver is gone.
async fn forward_watch(
    api: Api<DynamicObject>,
    resource_type: String,
    open_tx: oneshot::Sender<Result<()>>,
    tx: mpsc::Sender<Result<RawEvent>>,
) {
    // "0": start from whatever the server currently has
    let wp = WatchParams::default();
    let stream = match api.watch(&wp, "0").await {
        Ok(s) => s,
        Err(e) => {
            let _ = open_tx.send(Err(anyhow::Error::new(e).context(format!("opening watch for {}", resource_type))));
            return;
        }
    };
    if open_tx.send(Ok(())).is_err() {
        return;
    }
    futures::pin_mut!(stream);
    while let Some(item) = stream.next().await {
        let mapped = match item {
            Ok(ev) => map_watch_event(ev),
            Err(e) => Some(Err(anyhow::Error::new(e).context(format!("watch stream for {}", resource_type)))),
        };
        let Some(out) = mapped else { continue };
        let failed = out.is_err();
        if tx.send(out).await.is_err() || failed {
            break;
        }
    }
    debug!(resource = %resource_type, "watch forwarder exiting");
}

/// `ClusterSource` backed by a kube client.
#[derive(Clone)]
pub struct KubeSource {
    client: Client,
}

impl KubeSource {
    pub fn new(client: Client) -> Self { Self { client } }

    /// In-cluster config first, then kubeconfig.
    pub async fn try_default() -> Result<Self> {
        let client = Client::try_default().await.context("creating kube client")?;
        Ok(Self { client })
    }

    fn api_for(&self, resource_type: &str, namespace: Option<&str>) -> Result<Api<DynamicObject>> {
        let kind = ResourceKind::from_resource_tag(resource_type)
            .ok_or_else(|| anyhow!("unknown resource type: {}", resource_type))?;
        let ar = api_resource_for(kind);
        let api = if kind.namespaced() {
            match namespace {
                Some(ns) => Api::namespaced_with(self.client.clone(), ns, &ar),
                None => Api::all_with(self.client.clone(), &ar),
            }
        } else {
            Api::all_with(self.client.clone(), &ar)
        };
        Ok(api)
    }
}

#[async_trait::async_trait]
impl ClusterSource for KubeSource {
    async fn subscribe(&self, resource_type: &str, namespace: Option<&str>) -> Result<EventStream> {
        let api = self.api_for(resource_type, namespace)?;
        let (open_tx, open_rx) = oneshot::channel();
        let (tx, mut rx) = mpsc::channel(EVENT_QUEUE_CAP);
        tokio::spawn(forward_watch(api, resource_type.to_string(), open_tx, tx));
        open_rx
            .await
            .map_err(|_| anyhow!("watch task for {} ended before opening", resource_type))??;
        info!(resource = %resource_type, ns = ?namespace, "watch opened");
        Ok(async_stream::stream! {
            while let Some(item) = rx.recv().await {
                yield item;
            }
        }
        .boxed())
    }

    async fn list(&self, resource_type: &str, namespace: Option<&str>) -> Result<Vec<serde_json::Value>> {
        let api = self.api_for(resource_type, namespace)?;
        let list = api
            .list(&ListParams::default())
            .await
            .with_context(|| format!("listing {}", resource_type))?;
        debug!(resource = %resource_type, count = list.items.len(), "list ok");
        list.items.iter().map(to_json).collect()
    }
}
