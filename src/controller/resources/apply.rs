//! # Create-or-Apply
//!
//! The convergence primitive shared by every managed kind:
//!
//! 1. fetch the object by key
//! 2. warn when it already exists on the first pass of the IstioCSR
//! 3. update it when the diff engine reports drift, re-reading the resource
//!    version and retrying on conflict
//! 4. create it when absent
//!
//! Objects waiting for a generated name skip the fetch and are created.
//! Every store failure is classified with [`ReconcileError::from_client_error`].

use super::diff;
use super::{ManagedObject, ObjectKey};
use crate::controller::events::{actions, reasons, EventPublisher};
use crate::controller::retry::{retry_on_conflict, RetryPolicy};
use crate::controller::store::ObjectStore;
use crate::error::{ClientError, ReconcileError, StatusCategory};
use crate::observability::metrics;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::EventType;
use tracing::{debug, info, warn};

/// Collaborators of one convergence pass
pub struct ApplyContext<'a> {
    pub store: &'a dyn ObjectStore,
    pub events: &'a dyn EventPublisher,
    /// The IstioCSR events are attached to
    pub owner: &'a ObjectReference,
    pub retry: &'a RetryPolicy,
    /// True until the IstioCSR carries the processed annotation
    pub first_pass: bool,
}

/// What [`create_or_apply`] did
#[derive(Debug, Clone, PartialEq)]
pub enum ApplyOutcome {
    Created(ManagedObject),
    Updated(ManagedObject),
    Unchanged(ManagedObject),
}

impl ApplyOutcome {
    /// The object as last seen in the store
    pub fn object(&self) -> &ManagedObject {
        match self {
            ApplyOutcome::Created(o) | ApplyOutcome::Updated(o) | ApplyOutcome::Unchanged(o) => o,
        }
    }

    pub fn into_object(self) -> ManagedObject {
        match self {
            ApplyOutcome::Created(o) | ApplyOutcome::Updated(o) | ApplyOutcome::Unchanged(o) => o,
        }
    }
}

/// Drive one object to its desired state
pub async fn create_or_apply(
    ctx: &ApplyContext<'_>,
    desired: ManagedObject,
) -> Result<ApplyOutcome, ReconcileError> {
    let kind = desired.kind();
    let key = desired.key();

    let observed = if key.name.is_empty() {
        None
    } else {
        ctx.store.fetch(kind, &key).await.map_err(|e| {
            ReconcileError::from_client_error(e, format!("failed to check if {kind} {key} exists"))
        })?
    };

    match observed {
        Some(observed) => {
            if ctx.first_pass {
                warn!(kind = %kind, key = %key, "Resource already exists, possibly from a prior installation");
                publish(
                    ctx,
                    EventType::Warning,
                    reasons::RESOURCE_ALREADY_EXISTS,
                    actions::RECONCILE,
                    format!("{kind} {key} already exists, possibly from a prior installation"),
                )
                .await;
            }

            let drifted = diff::drifted_paths(&desired, &observed);
            if drifted.is_empty() {
                debug!(kind = %kind, key = %key, "Resource matches desired state");
                return Ok(ApplyOutcome::Unchanged(observed));
            }

            debug!(kind = %kind, key = %key, ?drifted, "Resource drifted from desired state");
            let updated = update_latest(ctx, &desired, &key).await.map_err(|e| {
                ReconcileError::from_client_error(e, format!("failed to update {kind} {key}"))
            })?;
            metrics::increment_resource_writes(kind.as_str(), "update");
            info!(kind = %kind, key = %key, "🔄 Reconciled resource back to desired state");
            publish(
                ctx,
                EventType::Normal,
                reasons::RESOURCE_RECONCILED,
                actions::UPDATE,
                format!("{kind} {key} reconciled back to desired state"),
            )
            .await;
            Ok(ApplyOutcome::Updated(updated))
        }
        None => {
            let created = ctx.store.create(&desired).await.map_err(|e| {
                ReconcileError::from_client_error(e, format!("failed to create {kind} {key}"))
            })?;
            metrics::increment_resource_writes(kind.as_str(), "create");
            let created_key = created.key();
            info!(kind = %kind, key = %created_key, "✅ Created resource");
            publish(
                ctx,
                EventType::Normal,
                reasons::RESOURCE_CREATED,
                actions::CREATE,
                format!("{kind} {created_key} created"),
            )
            .await;
            Ok(ApplyOutcome::Created(created))
        }
    }
}

/// Write `desired` over the latest stored version, retrying on conflict
async fn update_latest(
    ctx: &ApplyContext<'_>,
    desired: &ManagedObject,
    key: &ObjectKey,
) -> Result<ManagedObject, ClientError> {
    let kind = desired.kind();
    let store = ctx.store;
    let operation = format!("update {kind} {key}");
    retry_on_conflict(ctx.retry, &operation, || {
        let mut object = desired.clone();
        let key = key.clone();
        async move {
            let latest = store.fetch(kind, &key).await?.ok_or_else(|| {
                ClientError::new(
                    StatusCategory::NotFound,
                    format!("{kind} {key} disappeared before update"),
                )
            })?;
            object.set_resource_version(latest.resource_version().map(str::to_string));
            store.update(&object).await
        }
    })
    .await
}

async fn publish(
    ctx: &ApplyContext<'_>,
    type_: EventType,
    reason: &str,
    action: &str,
    note: String,
) {
    ctx.events
        .publish(ctx.owner, type_, reason, action, Some(note))
        .await;
}
