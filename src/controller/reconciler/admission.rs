//! # Singleton Admission
//!
//! Only one IstioCSR in the cluster is reconciled. An instance is rejected
//! when any other instance was created before it or at the same instant;
//! ties are never broken, so all tied instances end up rejected and the
//! user has to recreate a single one.
//!
//! A rejected instance carries the reject annotation and a Ready=False
//! condition with reason MultipleInstance. Once annotated it is never
//! checked again.
//!
//! When writing either marker fails transiently the pass ends as
//! RetryRequired instead, so the markers are written again after the
//! requeue delay rather than on the next unrelated event.

use super::metadata::{add_annotation, update_metadata};
use super::status::StatusTracker;
use super::types::Reconciler;
use crate::constants::*;
use crate::controller::events::{actions, reasons};
use crate::crd::IstioCSR;
use crate::error::ReconcileError;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::EventType;
use tracing::{info, warn};

const REJECTION_MESSAGE: &str = "multiple instances of istiocsr exist, only the oldest one is reconciled; delete this instance or recreate a single one";

/// True when `candidate` must be rejected in favour of one of `siblings`
///
/// `siblings` may include `candidate` itself.
pub fn is_rejected(candidate: &IstioCSR, siblings: &[IstioCSR]) -> bool {
    let Some(created) = candidate.metadata.creation_timestamp.as_ref() else {
        return false;
    };
    siblings
        .iter()
        .filter(|other| !same_instance(candidate, other))
        .filter_map(|other| other.metadata.creation_timestamp.as_ref())
        .any(|other_created| other_created.0 <= created.0)
}

fn same_instance(a: &IstioCSR, b: &IstioCSR) -> bool {
    match (&a.metadata.uid, &b.metadata.uid) {
        (Some(x), Some(y)) => x == y,
        _ => a.metadata.namespace == b.metadata.namespace && a.metadata.name == b.metadata.name,
    }
}

/// Admit `istio_csr` or reject it with a MultipleInstance error
///
/// On rejection both the annotation and the condition are written; a
/// failure of either is aggregated into the returned error.
pub async fn admit(
    ctx: &Reconciler,
    istio_csr: &IstioCSR,
    owner: &ObjectReference,
    status: &mut StatusTracker,
) -> Result<(), ReconcileError> {
    if istio_csr.has_annotation(REJECT_MULTIPLE_INSTANCE_ANNOTATION) {
        status.mark_rejected(REJECTION_MESSAGE);
        let failures = status.persist(ctx.store.as_ref(), istio_csr).await.err();
        return Err(rejection(failures));
    }

    let siblings = ctx.store.list_istio_csrs().await.map_err(|e| {
        ReconcileError::from_client_error(e, "failed to list istiocsr instances")
    })?;
    if siblings.len() <= 1 || !is_rejected(istio_csr, &siblings) {
        return Ok(());
    }

    warn!(
        instances = siblings.len(),
        "❌ Rejecting istiocsr, another instance was created earlier"
    );
    ctx.events
        .publish(
            owner,
            EventType::Warning,
            reasons::MULTIPLE_INSTANCES,
            actions::ADMIT,
            Some(REJECTION_MESSAGE.to_string()),
        )
        .await;

    let mut failures = Vec::new();
    if let Err(e) = update_metadata(
        ctx.store.as_ref(),
        &ctx.config.conflict_retry,
        istio_csr,
        "add reject annotation",
        |cr| add_annotation(cr, REJECT_MULTIPLE_INSTANCE_ANNOTATION),
    )
    .await
    {
        failures.push(e);
    }

    status.mark_rejected(REJECTION_MESSAGE);
    if let Err(e) = status.persist(ctx.store.as_ref(), istio_csr).await {
        failures.push(e);
    }

    if failures.is_empty() {
        info!("Marked istiocsr as rejected");
    }
    Err(rejection(failures))
}

/// Rejection error carrying the failures of the marker writes
///
/// Transient write failures turn the rejection into RetryRequired unless
/// one of them is irrecoverable.
fn rejection(failures: impl IntoIterator<Item = ReconcileError>) -> ReconcileError {
    let failures: Vec<ReconcileError> = failures.into_iter().collect();
    let retry = failures.iter().any(ReconcileError::is_retry_required)
        && !failures.iter().any(ReconcileError::is_irrecoverable);
    if retry {
        ReconcileError::retry_required(REJECTION_MESSAGE).aggregate(failures)
    } else {
        ReconcileError::multiple_instance(REJECTION_MESSAGE).aggregate(failures)
    }
}
