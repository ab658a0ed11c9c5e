//! # Managed Resources
//!
//! The closed set of object kinds the controller converges, plus the
//! kind-agnostic machinery that operates on them:
//!
//! - [`templates`] decodes the compiled-in manifests once at startup
//! - [`diff`] decides whether an observed object has drifted
//! - [`apply`] is the create-or-apply convergence primitive
//! - [`identity`] resolves the generated names of cluster-scoped RBAC
//!
//! The remaining sub-modules build the desired object of one kind from a
//! template and the IstioCSR.

pub mod apply;
pub mod ca_config_map;
pub mod certificate;
pub mod deployment;
pub mod diff;
pub mod identity;
pub mod network_policy;
pub mod rbac;
pub mod service;
pub mod service_account;
pub mod templates;

use crate::crd::cert_manager::Certificate;
use crate::crd::IstioCSR;
use crate::error::ReconcileError;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Service, ServiceAccount};
use k8s_openapi::api::networking::v1::NetworkPolicy;
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, Role, RoleBinding};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::Resource;
use std::collections::BTreeMap;
use std::fmt;

pub use templates::{IdentityStrategy, ManagedResourceSpec, ManagedResources, Placement};

/// Kinds of object the controller manages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    NetworkPolicy,
    Service,
    ServiceAccount,
    ClusterRole,
    ClusterRoleBinding,
    Role,
    RoleBinding,
    Certificate,
    ConfigMap,
    Deployment,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::NetworkPolicy => "NetworkPolicy",
            ResourceKind::Service => "Service",
            ResourceKind::ServiceAccount => "ServiceAccount",
            ResourceKind::ClusterRole => "ClusterRole",
            ResourceKind::ClusterRoleBinding => "ClusterRoleBinding",
            ResourceKind::Role => "Role",
            ResourceKind::RoleBinding => "RoleBinding",
            ResourceKind::Certificate => "Certificate",
            ResourceKind::ConfigMap => "ConfigMap",
            ResourceKind::Deployment => "Deployment",
        }
    }

    pub fn is_cluster_scoped(&self) -> bool {
        matches!(
            self,
            ResourceKind::ClusterRole | ResourceKind::ClusterRoleBinding
        )
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Primary key of an object; `namespace` is `None` for cluster-scoped kinds
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub namespace: Option<String>,
    pub name: String,
}

impl ObjectKey {
    pub fn namespaced(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            name: name.into(),
        }
    }

    pub fn cluster(name: impl Into<String>) -> Self {
        Self {
            namespace: None,
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}", ns, self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// One instance of a managed kind, desired or observed
#[derive(Debug, Clone, PartialEq)]
pub enum ManagedObject {
    NetworkPolicy(NetworkPolicy),
    Service(Service),
    ServiceAccount(ServiceAccount),
    ClusterRole(ClusterRole),
    ClusterRoleBinding(ClusterRoleBinding),
    Role(Role),
    RoleBinding(RoleBinding),
    Certificate(Certificate),
    ConfigMap(ConfigMap),
    Deployment(Deployment),
}

/// Evaluate `$body` with `$inner` bound to the typed object of any variant
macro_rules! with_inner {
    ($object:expr, $inner:ident => $body:expr) => {
        match $object {
            ManagedObject::NetworkPolicy($inner) => $body,
            ManagedObject::Service($inner) => $body,
            ManagedObject::ServiceAccount($inner) => $body,
            ManagedObject::ClusterRole($inner) => $body,
            ManagedObject::ClusterRoleBinding($inner) => $body,
            ManagedObject::Role($inner) => $body,
            ManagedObject::RoleBinding($inner) => $body,
            ManagedObject::Certificate($inner) => $body,
            ManagedObject::ConfigMap($inner) => $body,
            ManagedObject::Deployment($inner) => $body,
        }
    };
}

macro_rules! impl_from_typed {
    ($($variant:ident),* $(,)?) => {
        $(
            impl From<$variant> for ManagedObject {
                fn from(object: $variant) -> Self {
                    ManagedObject::$variant(object)
                }
            }
        )*
    };
}

impl_from_typed!(
    NetworkPolicy,
    Service,
    ServiceAccount,
    ClusterRole,
    ClusterRoleBinding,
    Role,
    RoleBinding,
    Certificate,
    ConfigMap,
    Deployment,
);

impl ManagedObject {
    pub fn kind(&self) -> ResourceKind {
        match self {
            ManagedObject::NetworkPolicy(_) => ResourceKind::NetworkPolicy,
            ManagedObject::Service(_) => ResourceKind::Service,
            ManagedObject::ServiceAccount(_) => ResourceKind::ServiceAccount,
            ManagedObject::ClusterRole(_) => ResourceKind::ClusterRole,
            ManagedObject::ClusterRoleBinding(_) => ResourceKind::ClusterRoleBinding,
            ManagedObject::Role(_) => ResourceKind::Role,
            ManagedObject::RoleBinding(_) => ResourceKind::RoleBinding,
            ManagedObject::Certificate(_) => ResourceKind::Certificate,
            ManagedObject::ConfigMap(_) => ResourceKind::ConfigMap,
            ManagedObject::Deployment(_) => ResourceKind::Deployment,
        }
    }

    pub fn meta(&self) -> &ObjectMeta {
        with_inner!(self, o => o.meta())
    }

    pub fn meta_mut(&mut self) -> &mut ObjectMeta {
        with_inner!(self, o => o.meta_mut())
    }

    /// Key of the object; empty name when the server has yet to generate one
    pub fn key(&self) -> ObjectKey {
        let meta = self.meta();
        ObjectKey {
            namespace: meta.namespace.clone(),
            name: meta.name.clone().unwrap_or_default(),
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.meta().name.as_deref()
    }

    pub fn labels(&self) -> Option<&BTreeMap<String, String>> {
        self.meta().labels.as_ref()
    }

    pub fn resource_version(&self) -> Option<&str> {
        self.meta().resource_version.as_deref()
    }

    pub fn set_resource_version(&mut self, version: Option<String>) {
        self.meta_mut().resource_version = version;
    }

    /// JSON representation used by the diff engine
    pub fn to_value(&self) -> serde_json::Value {
        with_inner!(self, o => serde_json::to_value(o)).unwrap_or(serde_json::Value::Null)
    }
}

/// Inputs shared by every builder during one pass
#[derive(Debug, Clone)]
pub struct DesiredContext<'a> {
    pub istio_csr: &'a IstioCSR,
    /// Namespace of the IstioCSR
    pub namespace: String,
    /// Namespace of the istio control plane
    pub istio_namespace: String,
    /// Labels applied to every managed object
    pub labels: BTreeMap<String, String>,
}

impl<'a> DesiredContext<'a> {
    pub fn new(
        istio_csr: &'a IstioCSR,
        default_labels: &BTreeMap<String, String>,
    ) -> Result<Self, ReconcileError> {
        let namespace = istio_csr
            .metadata
            .namespace
            .clone()
            .ok_or_else(|| ReconcileError::irrecoverable("IstioCSR has no namespace"))?;
        let istio_namespace = istio_csr.spec.istio_csr_config.istio.namespace.clone();
        if istio_namespace.trim().is_empty() {
            return Err(ReconcileError::irrecoverable(
                "spec.istioCSRConfig.istio.namespace must not be empty",
            ));
        }
        Ok(Self {
            istio_csr,
            namespace,
            istio_namespace,
            labels: resource_labels(default_labels, istio_csr),
        })
    }

    pub fn instantiate<K>(&self, spec: &ManagedResourceSpec<K>) -> K
    where
        K: Resource + Clone,
    {
        spec.instantiate(&self.namespace, &self.istio_namespace, &self.labels)
    }
}

/// Build the labels applied to every managed object of `istio_csr`
///
/// Precedence (last wins): controller defaults, `spec.controllerConfig.labels`,
/// then the ownership label linking the object back to the instance.
pub fn resource_labels(
    default_labels: &BTreeMap<String, String>,
    istio_csr: &IstioCSR,
) -> BTreeMap<String, String> {
    let mut labels = default_labels.clone();
    if let Some(config) = &istio_csr.spec.controller_config {
        labels.extend(config.labels.clone());
    }
    labels.insert(
        crate::constants::WATCH_LABEL.to_string(),
        istio_csr.watch_label_value(),
    );
    labels
}

/// Labels selecting the objects owned by `istio_csr`
pub fn ownership_selector(istio_csr: &IstioCSR) -> BTreeMap<String, String> {
    BTreeMap::from([
        (
            crate::constants::APP_LABEL.to_string(),
            crate::constants::ISTIO_CSR_NAME.to_string(),
        ),
        (
            crate::constants::WATCH_LABEL.to_string(),
            istio_csr.watch_label_value(),
        ),
    ])
}

/// True when every `key=value` of `selector` is present on `labels`
pub fn matches_selector(
    labels: Option<&BTreeMap<String, String>>,
    selector: &BTreeMap<String, String>,
) -> bool {
    selector
        .iter()
        .all(|(k, v)| labels.and_then(|l| l.get(k)) == Some(v))
}

/// Render a selector in `k=v,k2=v2` form for list calls
pub fn selector_string(selector: &BTreeMap<String, String>) -> String {
    selector
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}
