//! Built-in resource kinds and their details summaries.
//!
//! This module provides:
//! - A closed set of supported kinds with their resource tags ("pods") and
//!   object kinds ("Pod")
//! - Generic identity extraction (namespace/name/resourceVersion) that works on
//!   any object
//! - A short human-readable summary per kind, used as `ChangeRecord.details`

#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Details used when the object kind is not one of the built-ins.
pub const UNKNOWN_DETAILS: &str = "Unknown resource type";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Pod,
    Deployment,
    ReplicaSet,
    DaemonSet,
    StatefulSet,
    Service,
    ConfigMap,
    Secret,
    Job,
    CronJob,
    PersistentVolume,
    PersistentVolumeClaim,
    Ingress,
    NetworkPolicy,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 14] = [
        ResourceKind::Pod,
        ResourceKind::Deployment,
        ResourceKind::ReplicaSet,
        ResourceKind::DaemonSet,
        ResourceKind::StatefulSet,
        ResourceKind::Service,
        ResourceKind::ConfigMap,
        ResourceKind::Secret,
        ResourceKind::Job,
        ResourceKind::CronJob,
        ResourceKind::PersistentVolume,
        ResourceKind::PersistentVolumeClaim,
        ResourceKind::Ingress,
        ResourceKind::NetworkPolicy,
    ];

    /// Plural lower-case tag used in configuration and change records.
    pub fn resource_tag(&self) -> &'static str {
        match self {
            ResourceKind::Pod => "pods",
            ResourceKind::Deployment => "deployments",
            ResourceKind::ReplicaSet => "replicasets",
            ResourceKind::DaemonSet => "daemonsets",
            ResourceKind::StatefulSet => "statefulsets",
            ResourceKind::Service => "services",
            ResourceKind::ConfigMap => "configmaps",
            ResourceKind::Secret => "secrets",
            ResourceKind::Job => "jobs",
            ResourceKind::CronJob => "cronjobs",
            ResourceKind::PersistentVolume => "persistentvolumes",
            ResourceKind::PersistentVolumeClaim => "persistentvolumeclaims",
            ResourceKind::Ingress => "ingresses",
            ResourceKind::NetworkPolicy => "networkpolicies",
        }
    }

    /// `kind` field as served by the API server.
    pub fn object_kind(&self) -> &'static str {
        match self {
            ResourceKind::Pod => "Pod",
            ResourceKind::Deployment => "Deployment",
            ResourceKind::ReplicaSet => "ReplicaSet",
            ResourceKind::DaemonSet => "DaemonSet",
            ResourceKind::StatefulSet => "StatefulSet",
            ResourceKind::Service => "Service",
            ResourceKind::ConfigMap => "ConfigMap",
            ResourceKind::Secret => "Secret",
            ResourceKind::Job => "Job",
            ResourceKind::CronJob => "CronJob",
            ResourceKind::PersistentVolume => "PersistentVolume",
            ResourceKind::PersistentVolumeClaim => "PersistentVolumeClaim",
            ResourceKind::Ingress => "Ingress",
            ResourceKind::NetworkPolicy => "NetworkPolicy",
        }
    }

    pub fn namespaced(&self) -> bool {
        !matches!(self, ResourceKind::PersistentVolume)
    }

    pub fn from_resource_tag(tag: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.resource_tag() == tag)
    }

    pub fn from_object_kind(kind: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.object_kind() == kind)
    }

    /// Short summary of the object state for this kind.
    pub fn summarize(&self, raw: &Value) -> String {
        match self {
            ResourceKind::Pod => summarize_pod(raw),
            ResourceKind::Deployment => format!(
                "Replicas: {}/{}, Available: {}",
                int_at(raw, "/status/readyReplicas"),
                int_at(raw, "/status/replicas"),
                int_at(raw, "/status/availableReplicas"),
            ),
            ResourceKind::ReplicaSet | ResourceKind::StatefulSet => format!(
                "Replicas: {}/{}",
                int_at(raw, "/status/readyReplicas"),
                int_at(raw, "/status/replicas"),
            ),
            ResourceKind::DaemonSet => format!(
                "Desired: {}, Ready: {}",
                int_at(raw, "/status/desiredNumberScheduled"),
                int_at(raw, "/status/numberReady"),
            ),
            ResourceKind::Service => {
                let ports = raw.pointer("/spec/ports").and_then(|v| v.as_array()).map(|a| a.len()).unwrap_or(0);
                format!("Type: {}, Ports: {}", str_at(raw, "/spec/type"), ports)
            }
            ResourceKind::ConfigMap => format!("Data keys: {}", key_count(raw, "/data")),
            ResourceKind::Secret => format!("Type: {}, Data keys: {}", str_at(raw, "/type"), key_count(raw, "/data")),
            ResourceKind::Job => format!(
                "Active: {}, Succeeded: {}, Failed: {}",
                int_at(raw, "/status/active"),
                int_at(raw, "/status/succeeded"),
                int_at(raw, "/status/failed"),
            ),
            ResourceKind::CronJob => {
                let suspend = raw.pointer("/spec/suspend").and_then(|v| v.as_bool()).unwrap_or(false);
                format!("Schedule: {}, Suspend: {}", str_at(raw, "/spec/schedule"), suspend)
            }
            ResourceKind::PersistentVolume => format!(
                "Phase: {}, Capacity: {}",
                str_at(raw, "/status/phase"),
                quantity_at(raw, "/spec/capacity/storage"),
            ),
            ResourceKind::PersistentVolumeClaim => format!(
                "Phase: {}, Storage: {}",
                str_at(raw, "/status/phase"),
                quantity_at(raw, "/spec/resources/requests/storage"),
            ),
            ResourceKind::Ingress => {
                let rules = raw.pointer("/spec/rules").and_then(|v| v.as_array()).map(|a| a.len()).unwrap_or(0);
                format!("Rules: {}", rules)
            }
            ResourceKind::NetworkPolicy => format!("Pod selector: {}", render_selector(raw.pointer("/spec/podSelector"))),
        }
    }
}

fn str_at<'a>(raw: &'a Value, ptr: &str) -> &'a str {
    raw.pointer(ptr).and_then(|v| v.as_str()).unwrap_or("")
}

fn int_at(raw: &Value, ptr: &str) -> i64 {
    raw.pointer(ptr).and_then(|v| v.as_i64()).unwrap_or(0)
}

fn key_count(raw: &Value, ptr: &str) -> usize {
    raw.pointer(ptr).and_then(|v| v.as_object()).map(|m| m.len()).unwrap_or(0)
}

// Quantities are strings on the wire ("10Gi"); absent means zero.
fn quantity_at(raw: &Value, ptr: &str) -> String {
    match raw.pointer(ptr) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => "0".to_string(),
    }
}

fn summarize_pod(raw: &Value) -> String {
    let phase = str_at(raw, "/status/phase");
    let mut ready = false;
    if let Some(conds) = raw.pointer("/status/conditions").and_then(|v| v.as_array()) {
        for c in conds {
            if c.get("type").and_then(|v| v.as_str()) == Some("Ready") {
                ready = c.get("status").and_then(|v| v.as_str()) == Some("True");
                break;
            }
        }
    }
    format!("Phase: {}, Ready: {}", phase, ready)
}

fn render_selector(sel: Option<&Value>) -> String {
    let mut parts: Vec<String> = Vec::new();
    if let Some(labels) = sel.and_then(|s| s.get("matchLabels")).and_then(|v| v.as_object()) {
        for (k, v) in labels {
            parts.push(format!("{}={}", k, v.as_str().unwrap_or("")));
        }
    }
    if let Some(exprs) = sel.and_then(|s| s.get("matchExpressions")).and_then(|v| v.as_array()) {
        for e in exprs {
            let key = e.get("key").and_then(|v| v.as_str()).unwrap_or("");
            let op = e.get("operator").and_then(|v| v.as_str()).unwrap_or("");
            parts.push(format!("{} {}", key, op));
        }
    }
    if parts.is_empty() { "(all pods)".to_string() } else { parts.join(",") }
}

/// Identity fields available on every object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectIdentity {
    /// Empty for cluster-scoped objects.
    pub namespace: String,
    pub name: String,
    /// Empty when the object carries no version.
    pub resource_version: String,
}

/// Extract generic identity from `metadata`. None when no name is present.
pub fn identity(raw: &Value) -> Option<ObjectIdentity> {
    let meta = raw.get("metadata")?.as_object()?;
    let name = meta.get("name").and_then(|v| v.as_str()).filter(|s| !s.is_empty())?;
    let namespace = meta.get("namespace").and_then(|v| v.as_str()).unwrap_or("");
    let resource_version = meta.get("resourceVersion").and_then(|v| v.as_str()).unwrap_or("");
    Some(ObjectIdentity {
        namespace: namespace.to_string(),
        name: name.to_string(),
        resource_version: resource_version.to_string(),
    })
}

/// An object translated into the fields a change record needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classified {
    pub kind: Option<ResourceKind>,
    pub identity: ObjectIdentity,
    pub details: String,
}

/// Resolve the kind of `raw` and summarize it.
///
/// The object's own `kind` field wins; objects without one (list items) fall
/// back to the resource tag they were watched under. Unrecognized kinds get
/// generic identity and `UNKNOWN_DETAILS`. Returns None when the object has no
/// identity at all.
pub fn classify(resource_type: &str, raw: &Value) -> Option<Classified> {
    let identity = identity(raw)?;
    let kind = match raw.get("kind").and_then(|v| v.as_str()) {
        Some(k) if !k.is_empty() => ResourceKind::from_object_kind(k),
        _ => ResourceKind::from_resource_tag(resource_type),
    };
    let details = match kind {
        Some(k) => k.summarize(raw),
        None => UNKNOWN_DETAILS.to_string(),
    };
    Some(Classified { kind, identity, details })
}
