//! # IstioCSR Status
//!
//! Status types for tracking reconciliation state and conditions.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Status of the IstioCSR resource
#[derive(Debug, Clone, Deserialize, Serialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IstioCSRStatus {
    /// Conditions represent the latest available observations
    /// At most one entry per type
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// In-cluster gRPC endpoint of the agent (`<service>.<namespace>.svc:<port>`)
    #[serde(
        default,
        rename = "istioCSRGRPCEndpoint",
        skip_serializing_if = "Option::is_none"
    )]
    pub istio_csr_grpc_endpoint: Option<String>,
    /// Image the agent Deployment runs
    #[serde(
        default,
        rename = "istioCSRImage",
        skip_serializing_if = "Option::is_none"
    )]
    pub istio_csr_image: Option<String>,
    /// ServiceAccount of the agent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account: Option<String>,
    /// Generated name of the agent ClusterRole
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_role: Option<String>,
    /// Generated name of the agent ClusterRoleBinding
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_role_binding: Option<String>,
}

/// Condition represents a condition of a resource
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition
    pub r#type: String,
    /// Status of the condition (True, False, Unknown)
    pub status: String,
    /// Last transition time (RFC3339)
    #[serde(default)]
    pub last_transition_time: Option<String>,
    /// Reason for the condition
    #[serde(default)]
    pub reason: Option<String>,
    /// Message describing the condition
    #[serde(default)]
    pub message: Option<String>,
}
