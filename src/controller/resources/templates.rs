//! # Resource Templates
//!
//! Static manifests compiled into the binary and decoded once at startup.
//! Every pass clones a template and applies the fields derived from the
//! IstioCSR; templates themselves are never mutated.

use crate::constants::{ISTIO_CSR_GENERATE_NAME, ISTIO_CSR_NAME};
use crate::crd::cert_manager::Certificate;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Service, ServiceAccount};
use k8s_openapi::api::networking::v1::NetworkPolicy;
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, Role, RoleBinding};
use kube::Resource;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use thiserror::Error;

/// Failure to decode a compiled-in manifest
#[derive(Debug, Error)]
#[error("failed to decode template {name}: {source}")]
pub struct TemplateError {
    pub name: &'static str,
    #[source]
    pub source: serde_yaml::Error,
}

/// Namespace an instantiated template is placed in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Namespace of the IstioCSR
    IstioCsrNamespace,
    /// `spec.istioCSRConfig.istio.namespace`
    IstioNamespace,
    /// Cluster-scoped
    Cluster,
}

/// How the name of an instantiated template is determined
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityStrategy {
    /// The template name is used as is
    Fixed,
    /// The server generates a name from `generateName`; the result is cached in status
    Generated,
}

/// Immutable description of one managed object
#[derive(Debug, Clone)]
pub struct ManagedResourceSpec<K> {
    pub template: K,
    pub placement: Placement,
    pub identity: IdentityStrategy,
}

impl<K> ManagedResourceSpec<K>
where
    K: Resource + Clone,
{
    /// Clone the template into the given namespaces, merging `labels` over
    /// the template's own labels
    pub fn instantiate(
        &self,
        istio_csr_namespace: &str,
        istio_namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> K {
        let mut object = self.template.clone();
        let meta = object.meta_mut();
        meta.namespace = match self.placement {
            Placement::IstioCsrNamespace => Some(istio_csr_namespace.to_string()),
            Placement::IstioNamespace => Some(istio_namespace.to_string()),
            Placement::Cluster => None,
        };
        let mut merged = meta.labels.take().unwrap_or_default();
        merged.extend(labels.clone());
        meta.labels = Some(merged);
        if self.identity == IdentityStrategy::Generated {
            meta.name = None;
            meta.generate_name = Some(
                meta.generate_name
                    .take()
                    .unwrap_or_else(|| ISTIO_CSR_GENERATE_NAME.to_string()),
            );
        }
        object
    }

    /// Name of the instantiated object when it is fixed by the template
    pub fn fixed_name(&self) -> &str {
        self.template
            .meta()
            .name
            .as_deref()
            .unwrap_or(ISTIO_CSR_NAME)
    }
}

/// Every template the controller manages, in reconciliation order
#[derive(Debug, Clone)]
pub struct ManagedResources {
    pub network_policies: Vec<ManagedResourceSpec<NetworkPolicy>>,
    pub service: ManagedResourceSpec<Service>,
    pub service_account: ManagedResourceSpec<ServiceAccount>,
    pub cluster_role: ManagedResourceSpec<ClusterRole>,
    pub cluster_role_binding: ManagedResourceSpec<ClusterRoleBinding>,
    pub role: ManagedResourceSpec<Role>,
    pub role_binding: ManagedResourceSpec<RoleBinding>,
    pub role_leases: ManagedResourceSpec<Role>,
    pub role_binding_leases: ManagedResourceSpec<RoleBinding>,
    pub certificate: ManagedResourceSpec<Certificate>,
    pub ca_config_map: ManagedResourceSpec<ConfigMap>,
    pub deployment: ManagedResourceSpec<Deployment>,
}

const NETWORK_POLICY_DENY_ALL: &str =
    include_str!("../../../assets/networkpolicy_deny_all.yaml");
const NETWORK_POLICY_ALLOW_EGRESS_API_SERVER: &str =
    include_str!("../../../assets/networkpolicy_allow_egress_api_server.yaml");
const NETWORK_POLICY_ALLOW_INGRESS: &str =
    include_str!("../../../assets/networkpolicy_allow_ingress.yaml");
const SERVICE: &str = include_str!("../../../assets/service.yaml");
const SERVICE_ACCOUNT: &str = include_str!("../../../assets/serviceaccount.yaml");
const CLUSTER_ROLE: &str = include_str!("../../../assets/clusterrole.yaml");
const CLUSTER_ROLE_BINDING: &str = include_str!("../../../assets/clusterrolebinding.yaml");
const ROLE: &str = include_str!("../../../assets/role.yaml");
const ROLE_BINDING: &str = include_str!("../../../assets/rolebinding.yaml");
const ROLE_LEASES: &str = include_str!("../../../assets/role_leases.yaml");
const ROLE_BINDING_LEASES: &str = include_str!("../../../assets/rolebinding_leases.yaml");
const CERTIFICATE: &str = include_str!("../../../assets/certificate.yaml");
const CA_CONFIG_MAP: &str = include_str!("../../../assets/ca_configmap.yaml");
const DEPLOYMENT: &str = include_str!("../../../assets/deployment.yaml");

fn decode<K: DeserializeOwned>(
    name: &'static str,
    raw: &str,
    placement: Placement,
    identity: IdentityStrategy,
) -> Result<ManagedResourceSpec<K>, TemplateError> {
    let template =
        serde_yaml::from_str(raw).map_err(|source| TemplateError { name, source })?;
    Ok(ManagedResourceSpec {
        template,
        placement,
        identity,
    })
}

impl ManagedResources {
    /// Decode all compiled-in templates
    pub fn load() -> Result<Self, TemplateError> {
        use IdentityStrategy::{Fixed, Generated};
        use Placement::{Cluster, IstioCsrNamespace, IstioNamespace};

        Ok(Self {
            network_policies: vec![
                decode(
                    "networkpolicy_deny_all",
                    NETWORK_POLICY_DENY_ALL,
                    IstioCsrNamespace,
                    Fixed,
                )?,
                decode(
                    "networkpolicy_allow_egress_api_server",
                    NETWORK_POLICY_ALLOW_EGRESS_API_SERVER,
                    IstioCsrNamespace,
                    Fixed,
                )?,
                decode(
                    "networkpolicy_allow_ingress",
                    NETWORK_POLICY_ALLOW_INGRESS,
                    IstioCsrNamespace,
                    Fixed,
                )?,
            ],
            service: decode("service", SERVICE, IstioCsrNamespace, Fixed)?,
            service_account: decode("serviceaccount", SERVICE_ACCOUNT, IstioCsrNamespace, Fixed)?,
            cluster_role: decode("clusterrole", CLUSTER_ROLE, Cluster, Generated)?,
            cluster_role_binding: decode(
                "clusterrolebinding",
                CLUSTER_ROLE_BINDING,
                Cluster,
                Generated,
            )?,
            role: decode("role", ROLE, IstioNamespace, Fixed)?,
            role_binding: decode("rolebinding", ROLE_BINDING, IstioNamespace, Fixed)?,
            role_leases: decode("role_leases", ROLE_LEASES, IstioCsrNamespace, Fixed)?,
            role_binding_leases: decode(
                "rolebinding_leases",
                ROLE_BINDING_LEASES,
                IstioCsrNamespace,
                Fixed,
            )?,
            certificate: decode("certificate", CERTIFICATE, IstioNamespace, Fixed)?,
            ca_config_map: decode("ca_configmap", CA_CONFIG_MAP, IstioCsrNamespace, Fixed)?,
            deployment: decode("deployment", DEPLOYMENT, IstioCsrNamespace, Fixed)?,
        })
    }
}
