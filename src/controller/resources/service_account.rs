//! ServiceAccount the istio-csr pods run as.

use super::{DesiredContext, ManagedResourceSpec};
use k8s_openapi::api::core::v1::ServiceAccount;

pub fn desired_service_account(
    spec: &ManagedResourceSpec<ServiceAccount>,
    ctx: &DesiredContext<'_>,
) -> ServiceAccount {
    ctx.instantiate(spec)
}
