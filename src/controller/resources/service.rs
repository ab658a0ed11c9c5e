//! Service exposing the istio-csr gRPC endpoint inside the cluster.

use super::{DesiredContext, ManagedResourceSpec};
use crate::error::ReconcileError;
use k8s_openapi::api::core::v1::Service;

/// The first template port is the gRPC port; its number comes from
/// `spec.istioCSRConfig.server.port`
pub fn desired_service(
    spec: &ManagedResourceSpec<Service>,
    ctx: &DesiredContext<'_>,
) -> Result<Service, ReconcileError> {
    let mut service = ctx.instantiate(spec);
    let port = service
        .spec
        .as_mut()
        .and_then(|s| s.ports.as_mut())
        .and_then(|ports| ports.first_mut())
        .ok_or_else(|| ReconcileError::irrecoverable("service template has no port"))?;
    port.port = ctx.istio_csr.server().port;
    Ok(service)
}

/// In-cluster address of the gRPC endpoint recorded in status
pub fn grpc_endpoint(service: &Service) -> Option<String> {
    let name = service.metadata.name.as_deref()?;
    let namespace = service.metadata.namespace.as_deref()?;
    let port = service.spec.as_ref()?.ports.as_ref()?.first()?.port;
    Some(format!("{name}.{namespace}.svc:{port}"))
}
