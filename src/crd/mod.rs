//! # Custom Resource Definitions
//!
//! CRD types for the istio-csr controller.
//!
//! `IstioCSR` is the single user-authored resource the controller converges.
//! The cert-manager kinds the controller reads or writes live in [`cert_manager`].

pub mod cert_manager;
mod status;

pub use status::{Condition, IstioCSRStatus};

use k8s_openapi::api::core::v1::{Affinity, ResourceRequirements, Toleration};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// IstioCSR Custom Resource Definition
///
/// Describes the desired istio-csr agent deployment for one namespace.
///
/// # Example
///
/// ```yaml
/// apiVersion: operator.openshift.io/v1alpha1
/// kind: IstioCSR
/// metadata:
///   name: default
///   namespace: istio-csr
/// spec:
///   istioCSRConfig:
///     certManager:
///       issuerRef:
///         name: istio-ca
///         kind: Issuer
///         group: cert-manager.io
///     istiodTLSConfig:
///       trustDomain: cluster.local
///     istio:
///       namespace: istio-system
/// ```
#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    kind = "IstioCSR",
    group = "operator.openshift.io",
    version = "v1alpha1",
    plural = "istiocsrs",
    namespaced,
    status = "IstioCSRStatus",
    shortname = "istiocsr",
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}, {"name":"Endpoint", "type":"string", "jsonPath":".status.istioCSRGRPCEndpoint"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct IstioCSRSpec {
    /// Configuration of the istio-csr agent
    #[serde(rename = "istioCSRConfig")]
    pub istio_csr_config: IstioCSRConfig,
    /// Controller behaviour applied to every managed resource
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller_config: Option<ControllerConfigSpec>,
}

/// istio-csr agent configuration
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IstioCSRConfig {
    /// Verbosity of the agent logs (1-5)
    #[serde(default = "default_log_level")]
    pub log_level: i32,
    /// Log format: "text" or "json"
    #[serde(default = "default_log_format")]
    pub log_format: String,
    /// TLS settings of the istiod certificate and the agent serving certificate
    #[serde(rename = "istiodTLSConfig")]
    pub istiod_tls_config: IstiodTLSConfig,
    /// gRPC server settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<ServerConfig>,
    /// Istio control plane the agent serves
    pub istio: IstioConfig,
    /// cert-manager issuer used to sign workload certificates
    pub cert_manager: CertManagerConfig,
    /// Compute resources of the agent container
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,
    /// Scheduling affinity of the agent pod
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affinity: Option<Affinity>,
    /// Tolerations of the agent pod
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tolerations: Option<Vec<Toleration>>,
    /// Node selector of the agent pod
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_selector: Option<BTreeMap<String, String>>,
    /// Label selector restricting the namespaces the agent watches for CA distribution
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub istio_data_plane_namespace_selector: Option<String>,
}

/// istiod and serving certificate configuration
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IstiodTLSConfig {
    /// Common name of the istiod certificate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub common_name: Option<String>,
    /// Istio trust domain (e.g. "cluster.local")
    pub trust_domain: String,
    /// Additional DNS names of the istiod certificate
    #[serde(
        default,
        rename = "certificateDNSNames",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub certificate_dns_names: Vec<String>,
    /// Requested certificate lifetime
    #[serde(default = "default_certificate_duration")]
    pub certificate_duration: String,
    /// How long before expiry the certificate is renewed
    #[serde(default = "default_certificate_renew_before")]
    pub certificate_renew_before: String,
    /// Private key size in bits
    #[serde(default = "default_private_key_size")]
    pub private_key_size: i32,
    /// Private key algorithm: "RSA" or "ECDSA"
    #[serde(default = "default_private_key_algorithm")]
    pub private_key_algorithm: String,
    /// Signature algorithm of the serving certificate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature_algorithm: Option<String>,
    /// Maximum lifetime of client certificates issued through the agent
    #[serde(default = "default_certificate_duration")]
    pub max_certificate_duration: String,
}

/// gRPC server configuration
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Istio cluster ID used to verify incoming CSRs
    #[serde(default = "default_cluster_id", rename = "clusterID")]
    pub cluster_id: String,
    /// Service port of the gRPC endpoint
    #[serde(default = "default_server_port")]
    pub port: i32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            cluster_id: default_cluster_id(),
            port: default_server_port(),
        }
    }
}

/// Istio control plane configuration
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IstioConfig {
    /// Istio revisions the agent serves
    #[serde(default = "default_revisions")]
    pub revisions: Vec<String>,
    /// Namespace of the istio control plane
    pub namespace: String,
}

/// cert-manager configuration
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CertManagerConfig {
    /// Issuer or ClusterIssuer signing the certificates
    pub issuer_ref: IssuerRef,
    /// ConfigMap holding the root CA certificate distributed to workloads
    #[serde(
        default,
        rename = "istioCACertificate",
        skip_serializing_if = "Option::is_none"
    )]
    pub istio_ca_certificate: Option<ConfigMapReference>,
}

/// Reference to a cert-manager issuer
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IssuerRef {
    pub name: String,
    /// "Issuer" or "ClusterIssuer"
    #[serde(default = "default_issuer_kind")]
    pub kind: String,
    /// Must be "cert-manager.io"
    #[serde(default = "default_issuer_group")]
    pub group: String,
}

/// Reference to a key of a ConfigMap
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConfigMapReference {
    pub name: String,
    /// Defaults to the IstioCSR namespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub key: String,
}

/// Controller behaviour configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ControllerConfigSpec {
    /// Labels added to every managed resource
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

fn default_log_level() -> i32 {
    1
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_certificate_duration() -> String {
    "1h".to_string()
}

fn default_certificate_renew_before() -> String {
    "30m".to_string()
}

fn default_private_key_size() -> i32 {
    2048
}

fn default_private_key_algorithm() -> String {
    "RSA".to_string()
}

fn default_cluster_id() -> String {
    "Kubernetes".to_string()
}

fn default_server_port() -> i32 {
    443
}

fn default_revisions() -> Vec<String> {
    vec!["default".to_string()]
}

fn default_issuer_kind() -> String {
    "Issuer".to_string()
}

fn default_issuer_group() -> String {
    crate::constants::CERT_MANAGER_GROUP.to_string()
}

impl IstioCSR {
    /// Server settings with defaults applied
    pub fn server(&self) -> ServerConfig {
        self.spec
            .istio_csr_config
            .server
            .clone()
            .unwrap_or_default()
    }

    /// Value of the label linking managed resources back to this instance
    pub fn watch_label_value(&self) -> String {
        format!(
            "{}_{}",
            self.metadata.namespace.as_deref().unwrap_or_default(),
            self.metadata.name.as_deref().unwrap_or_default()
        )
    }

    pub fn has_annotation(&self, key: &str) -> bool {
        self.metadata
            .annotations
            .as_ref()
            .is_some_and(|a| a.contains_key(key))
    }

    pub fn has_finalizer(&self, finalizer: &str) -> bool {
        self.metadata
            .finalizers
            .as_ref()
            .is_some_and(|f| f.iter().any(|x| x == finalizer))
    }
}
