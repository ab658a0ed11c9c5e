//! # Convergence
//!
//! One convergence pass over every managed resource of an admitted
//! IstioCSR, in dependency order:
//!
//! 1. NetworkPolicies
//! 2. Service (gRPC endpoint recorded in status)
//! 3. ServiceAccount (name recorded in status)
//! 4. RBAC: ClusterRole, ClusterRoleBinding, Roles and RoleBindings
//! 5. istiod Certificate
//! 6. CA ConfigMap (when a root CA is known) and the Deployment
//!
//! The pass stops at the first error. Configuration is validated before
//! anything is written.

use super::status::StatusTracker;
use super::types::Reconciler;
use super::validation::{fetch_issuer, resolve_root_ca, validate_issuer_ref, validate_private_key};
use crate::config::IMAGE_ENV;
use crate::controller::events::{actions, reasons};
use crate::controller::resources::apply::{create_or_apply, ApplyContext, ApplyOutcome};
use crate::controller::resources::identity::resolve_generated_name;
use crate::controller::resources::{
    ca_config_map, certificate, deployment, network_policy, ownership_selector, rbac, service,
    service_account, DesiredContext, ManagedObject, ResourceKind,
};
use crate::crd::IstioCSR;
use crate::error::ReconcileError;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::EventType;
use tracing::{debug, info, warn};

/// Converge every managed resource of `istio_csr`
///
/// Status fields owned by the pass (service account, generated RBAC names,
/// endpoint, image) are updated on `status`; conditions are left to the
/// caller.
pub async fn converge(
    ctx: &Reconciler,
    istio_csr: &IstioCSR,
    owner: &ObjectReference,
    first_pass: bool,
    status: &mut StatusTracker,
) -> Result<(), ReconcileError> {
    let image = ctx.config.istio_csr_image.clone().ok_or_else(|| {
        ReconcileError::irrecoverable(format!(
            "{IMAGE_ENV} environment variable is not set, cannot deploy istio-csr"
        ))
    })?;

    // Snapshot: later metadata writes on the live object must not change
    // what this pass builds.
    let snapshot = istio_csr.clone();
    let desired = DesiredContext::new(&snapshot, &ctx.config.default_labels)?;
    let config = &snapshot.spec.istio_csr_config;

    let issuer_kind = validate_issuer_ref(&snapshot)?;
    validate_private_key(&config.istiod_tls_config)?;
    let issuer = fetch_issuer(
        ctx.store.as_ref(),
        &snapshot,
        issuer_kind,
        &desired.istio_namespace,
    )
    .await?;
    let root_ca = resolve_root_ca(
        ctx.store.as_ref(),
        &snapshot,
        issuer_kind,
        &issuer,
        &desired.istio_namespace,
        &ctx.config.cluster_resource_namespace,
    )
    .await?;

    let apply = ApplyContext {
        store: ctx.store.as_ref(),
        events: ctx.events.as_ref(),
        owner,
        retry: &ctx.config.conflict_retry,
        first_pass,
    };
    let templates = &ctx.resources;

    for policy in network_policy::desired_network_policies(&templates.network_policies, &desired) {
        create_or_apply(&apply, policy.into()).await?;
    }

    let applied = create_or_apply(
        &apply,
        service::desired_service(&templates.service, &desired)?.into(),
    )
    .await?;
    if let ManagedObject::Service(svc) = applied.object() {
        status.status.istio_csr_grpc_endpoint = service::grpc_endpoint(svc);
    }

    let applied = create_or_apply(
        &apply,
        service_account::desired_service_account(&templates.service_account, &desired).into(),
    )
    .await?;
    status.status.service_account = applied.object().name().map(str::to_string);

    let cluster_role = converge_generated(
        ctx,
        &apply,
        &snapshot,
        status,
        ResourceKind::ClusterRole,
        |name| Ok(rbac::desired_cluster_role(&templates.cluster_role, &desired, name).into()),
    )
    .await?;
    converge_generated(
        ctx,
        &apply,
        &snapshot,
        status,
        ResourceKind::ClusterRoleBinding,
        |name| {
            rbac::desired_cluster_role_binding(
                &templates.cluster_role_binding,
                &desired,
                name,
                &cluster_role,
            )
            .map(Into::into)
        },
    )
    .await?;
    create_or_apply(&apply, rbac::desired_role(&templates.role, &desired).into()).await?;
    create_or_apply(
        &apply,
        rbac::desired_role_binding(&templates.role_binding, &desired)?.into(),
    )
    .await?;
    create_or_apply(&apply, rbac::desired_role(&templates.role_leases, &desired).into()).await?;
    create_or_apply(
        &apply,
        rbac::desired_role_binding(&templates.role_binding_leases, &desired)?.into(),
    )
    .await?;

    create_or_apply(
        &apply,
        certificate::desired_certificate(&templates.certificate, &desired).into(),
    )
    .await?;

    if let Some(pem) = &root_ca {
        create_or_apply(
            &apply,
            ca_config_map::desired_ca_config_map(&templates.ca_config_map, &desired, pem).into(),
        )
        .await?;
    }
    let applied = create_or_apply(
        &apply,
        deployment::desired_deployment(&templates.deployment, &desired, &image, root_ca.is_some())?
            .into(),
    )
    .await?;
    if let ApplyOutcome::Created(_) = applied {
        info!(image = %image, "🚀 istio-csr deployment created");
    }
    status.status.istio_csr_image = Some(image);

    debug!("All managed resources converged");
    Ok(())
}

/// Converge a generated-name object and cache its name in status
///
/// The name is written to status right away; a failed write is reported
/// and the pass carries on, the final status write retries it.
async fn converge_generated<F>(
    ctx: &Reconciler,
    apply: &ApplyContext<'_>,
    istio_csr: &IstioCSR,
    status: &mut StatusTracker,
    kind: ResourceKind,
    build: F,
) -> Result<String, ReconcileError>
where
    F: FnOnce(Option<&str>) -> Result<ManagedObject, ReconcileError>,
{
    let cached = cached_name(status, kind);
    let resolved = resolve_generated_name(
        ctx.store.as_ref(),
        kind,
        cached.as_deref(),
        &ownership_selector(istio_csr),
    )
    .await?;

    let applied = create_or_apply(apply, build(resolved.as_deref())?).await?;
    let name = applied
        .object()
        .name()
        .map(str::to_string)
        .ok_or_else(|| ReconcileError::retry_required(format!("{kind} was stored without a name")))?;

    if cached.as_deref() != Some(name.as_str()) {
        set_cached_name(status, kind, name.clone());
        if let Err(e) = status.persist(ctx.store.as_ref(), istio_csr).await {
            warn!(kind = %kind, name = %name, error = %e, "Failed to record generated name in status");
            ctx.events
                .publish(
                    apply.owner,
                    EventType::Warning,
                    reasons::STATUS_UPDATE_FAILED,
                    actions::UPDATE,
                    Some(format!("failed to record {kind} name {name} in status: {e}")),
                )
                .await;
        }
    }
    Ok(name)
}

fn cached_name(status: &StatusTracker, kind: ResourceKind) -> Option<String> {
    match kind {
        ResourceKind::ClusterRole => status.status.cluster_role.clone(),
        ResourceKind::ClusterRoleBinding => status.status.cluster_role_binding.clone(),
        _ => None,
    }
}

fn set_cached_name(status: &mut StatusTracker, kind: ResourceKind, name: String) {
    match kind {
        ResourceKind::ClusterRole => status.status.cluster_role = Some(name),
        ResourceKind::ClusterRoleBinding => status.status.cluster_role_binding = Some(name),
        _ => {}
    }
}
