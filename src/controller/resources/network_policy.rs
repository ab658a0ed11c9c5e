//! NetworkPolicies isolating the istio-csr pods: deny everything, then allow
//! egress to the API server and ingress to the gRPC and metrics ports.

use super::{DesiredContext, ManagedResourceSpec};
use k8s_openapi::api::networking::v1::NetworkPolicy;

pub fn desired_network_policies(
    specs: &[ManagedResourceSpec<NetworkPolicy>],
    ctx: &DesiredContext<'_>,
) -> Vec<NetworkPolicy> {
    specs.iter().map(|spec| ctx.instantiate(spec)).collect()
}
