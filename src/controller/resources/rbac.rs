//! # RBAC
//!
//! Cluster-wide ClusterRole and ClusterRoleBinding (generated names), the
//! certificate-request Role and RoleBinding in the istio namespace and the
//! leader-election Role and RoleBinding in the IstioCSR namespace.
//!
//! Every binding's subject is the istio-csr ServiceAccount.

use super::{DesiredContext, ManagedResourceSpec};
use crate::constants::ISTIO_CSR_NAME;
use crate::error::ReconcileError;
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, Role, RoleBinding, Subject};
use kube::Resource;

/// `name` is the resolved generated name, `None` when one must be generated
pub fn desired_cluster_role(
    spec: &ManagedResourceSpec<ClusterRole>,
    ctx: &DesiredContext<'_>,
    name: Option<&str>,
) -> ClusterRole {
    let mut role = ctx.instantiate(spec);
    assign_name(&mut role, name);
    role
}

pub fn desired_cluster_role_binding(
    spec: &ManagedResourceSpec<ClusterRoleBinding>,
    ctx: &DesiredContext<'_>,
    name: Option<&str>,
    cluster_role_name: &str,
) -> Result<ClusterRoleBinding, ReconcileError> {
    let mut binding = ctx.instantiate(spec);
    assign_name(&mut binding, name);
    binding.role_ref.name = cluster_role_name.to_string();
    bind_service_account(binding.subjects.as_mut(), ctx)?;
    Ok(binding)
}

pub fn desired_role(spec: &ManagedResourceSpec<Role>, ctx: &DesiredContext<'_>) -> Role {
    ctx.instantiate(spec)
}

pub fn desired_role_binding(
    spec: &ManagedResourceSpec<RoleBinding>,
    ctx: &DesiredContext<'_>,
) -> Result<RoleBinding, ReconcileError> {
    let mut binding = ctx.instantiate(spec);
    bind_service_account(binding.subjects.as_mut(), ctx)?;
    Ok(binding)
}

fn assign_name<K: Resource>(object: &mut K, name: Option<&str>) {
    if let Some(name) = name {
        let meta = object.meta_mut();
        meta.name = Some(name.to_string());
        meta.generate_name = None;
    }
}

fn bind_service_account(
    subjects: Option<&mut Vec<Subject>>,
    ctx: &DesiredContext<'_>,
) -> Result<(), ReconcileError> {
    let subject = subjects
        .and_then(|s| s.first_mut())
        .ok_or_else(|| ReconcileError::irrecoverable("binding template has no subject"))?;
    subject.name = ISTIO_CSR_NAME.to_string();
    subject.namespace = Some(ctx.namespace.clone());
    Ok(())
}
