//! # Object Diff Engine
//!
//! Decides whether an observed object has drifted from the desired one.
//!
//! Only the fields the controller sets are compared. Each kind has a fixed
//! allow-list of JSON paths ([`compared_paths`]); `*` expands over every
//! element of an array. `/metadata/labels` is compared for every kind.
//!
//! Before comparison both sides are normalized so that an absent field, an
//! explicit `null`, an empty list and an empty map are all equal. Server
//! defaulted fields outside the allow-list never cause drift.

use super::{ManagedObject, ResourceKind};
use serde_json::Value;

const LABELS: &str = "/metadata/labels";

const NETWORK_POLICY_PATHS: &[&str] = &["/spec"];

const SERVICE_PATHS: &[&str] = &["/spec/type", "/spec/ports", "/spec/selector"];

const SERVICE_ACCOUNT_PATHS: &[&str] = &[];

const ROLE_PATHS: &[&str] = &["/rules"];

const BINDING_PATHS: &[&str] = &["/roleRef", "/subjects"];

const CERTIFICATE_PATHS: &[&str] = &["/spec"];

const CONFIG_MAP_PATHS: &[&str] = &["/data"];

const DEPLOYMENT_PATHS: &[&str] = &[
    "/spec/replicas",
    "/spec/selector/matchLabels",
    "/spec/template/metadata/labels",
    "/spec/template/spec/serviceAccountName",
    "/spec/template/spec/nodeSelector",
    "/spec/template/spec/volumes",
    "/spec/template/spec/affinity",
    "/spec/template/spec/tolerations",
    "/spec/template/spec/containers/*/name",
    "/spec/template/spec/containers/*/image",
    "/spec/template/spec/containers/*/args",
    "/spec/template/spec/containers/*/ports",
    "/spec/template/spec/containers/*/readinessProbe",
    "/spec/template/spec/containers/*/resources",
    "/spec/template/spec/containers/*/securityContext",
    "/spec/template/spec/containers/*/volumeMounts",
];

/// Kind-specific paths compared in addition to the labels
pub fn compared_paths(kind: ResourceKind) -> &'static [&'static str] {
    match kind {
        ResourceKind::NetworkPolicy => NETWORK_POLICY_PATHS,
        ResourceKind::Service => SERVICE_PATHS,
        ResourceKind::ServiceAccount => SERVICE_ACCOUNT_PATHS,
        ResourceKind::ClusterRole | ResourceKind::Role => ROLE_PATHS,
        ResourceKind::ClusterRoleBinding | ResourceKind::RoleBinding => BINDING_PATHS,
        ResourceKind::Certificate => CERTIFICATE_PATHS,
        ResourceKind::ConfigMap => CONFIG_MAP_PATHS,
        ResourceKind::Deployment => DEPLOYMENT_PATHS,
    }
}

/// True when `observed` must be rewritten to satisfy `desired`
pub fn changed(desired: &ManagedObject, observed: &ManagedObject) -> bool {
    !drifted_paths(desired, observed).is_empty()
}

/// Compared paths whose values differ; a kind mismatch reports every path
pub fn drifted_paths(desired: &ManagedObject, observed: &ManagedObject) -> Vec<&'static str> {
    let kind = desired.kind();
    let paths = std::iter::once(LABELS).chain(compared_paths(kind).iter().copied());
    if observed.kind() != kind {
        return paths.collect();
    }

    let desired = desired.to_value();
    let observed = observed.to_value();
    paths
        .filter(|path| {
            let segments: Vec<&str> = path.split('/').skip(1).collect();
            normalize(project(&desired, &segments)) != normalize(project(&observed, &segments))
        })
        .collect()
}

/// Extract the value at `segments`, expanding `*` over arrays
fn project(value: &Value, segments: &[&str]) -> Value {
    match segments.split_first() {
        None => value.clone(),
        Some((&"*", rest)) => match value {
            Value::Array(items) => {
                Value::Array(items.iter().map(|item| project(item, rest)).collect())
            }
            _ => Value::Null,
        },
        Some((segment, rest)) => value
            .get(*segment)
            .map(|child| project(child, rest))
            .unwrap_or(Value::Null),
    }
}

/// Collapse empty maps, empty lists and null map entries to `Null`
fn normalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let map: serde_json::Map<String, Value> = map
                .into_iter()
                .map(|(k, v)| (k, normalize(v)))
                .filter(|(_, v)| !v.is_null())
                .collect();
            if map.is_empty() {
                Value::Null
            } else {
                Value::Object(map)
            }
        }
        Value::Array(items) if items.is_empty() => Value::Null,
        Value::Array(items) => Value::Array(items.into_iter().map(normalize).collect()),
        other => other,
    }
}
