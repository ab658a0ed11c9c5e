//! # Reconcile
//!
//! The per-instance state machine driven by the controller runtime:
//!
//! 1. fetch the IstioCSR; a deleted instance ends the pass
//! 2. an instance being deleted only has its finalizer removed
//! 3. ensure the finalizer
//! 4. singleton admission
//! 5. converge the managed resources
//! 6. record the outcome in the Ready/Degraded conditions
//!
//! Only this module branches on the error reason:
//!
//! - success ends the pass without a requeue
//! - RetryRequired is recorded as Progressing and requeued after a fixed delay
//! - Irrecoverable is recorded as Degraded and returned, no retry until the
//!   IstioCSR changes
//! - MultipleInstance is returned as is

use super::admission;
use super::converge::converge;
use super::metadata::{
    add_annotation, add_finalizer, istio_csr_key, remove_finalizer, update_metadata,
};
use super::status::StatusTracker;
use super::types::{Outcome, Reconciler};
use crate::constants::*;
use crate::controller::events::{actions, reasons};
use crate::controller::resources::ObjectKey;
use crate::crd::IstioCSR;
use crate::error::ReconcileError;
use crate::observability::metrics;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::controller::Action;
use kube::runtime::events::EventType;
use kube::Resource;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn, Instrument};

/// Entry point for `kube::runtime::Controller`
pub async fn reconcile(
    istio_csr: Arc<IstioCSR>,
    ctx: Arc<Reconciler>,
) -> Result<Action, ReconcileError> {
    let key = istio_csr_key(&istio_csr);
    let span = tracing::info_span!(
        "controller.reconcile",
        resource.name = %key.name,
        resource.namespace = key.namespace.as_deref().unwrap_or_default(),
    );

    let start = Instant::now();
    metrics::increment_reconciliations();
    let result = ctx.reconcile_istio_csr(&key).instrument(span).await;
    metrics::observe_reconciliation_duration(start.elapsed().as_secs_f64());

    match &result {
        Ok(Outcome::RequeueAfter(_)) => metrics::increment_requeues_total("retry-required"),
        Err(e) => {
            metrics::increment_reconciliation_errors(e.reason().as_str());
            if e.is_multiple_instance() {
                metrics::increment_rejected_instances();
            }
        }
        Ok(Outcome::Done) => {}
    }
    result.map(Action::from)
}

impl Reconciler {
    /// Run one pass for the IstioCSR at `key`
    pub async fn reconcile_istio_csr(&self, key: &ObjectKey) -> Result<Outcome, ReconcileError> {
        let istio_csr = self.store.get_istio_csr(key).await.map_err(|e| {
            ReconcileError::from_client_error(e, format!("failed to fetch istiocsr {key}"))
        })?;
        let Some(istio_csr) = istio_csr else {
            debug!("istiocsr no longer exists, nothing to do");
            return Ok(Outcome::Done);
        };
        let owner = istio_csr.object_ref(&());

        if istio_csr.metadata.deletion_timestamp.is_some() {
            return self.finalize(&istio_csr, &owner).await;
        }

        let mut status = StatusTracker::new(&istio_csr);
        let istio_csr = match update_metadata(
            self.store.as_ref(),
            &self.config.conflict_retry,
            &istio_csr,
            "add finalizer",
            add_finalizer,
        )
        .await
        {
            Ok(updated) => updated,
            Err(e) => return self.settle(&istio_csr, Err(e), &mut status).await,
        };

        admission::admit(self, &istio_csr, &owner, &mut status).await?;

        let first_pass = !istio_csr.has_annotation(PROCESSED_ANNOTATION);
        let mut result = converge(self, &istio_csr, &owner, first_pass, &mut status).await;
        if result.is_ok() && first_pass {
            result = update_metadata(
                self.store.as_ref(),
                &self.config.conflict_retry,
                &istio_csr,
                "add processed annotation",
                |cr| add_annotation(cr, PROCESSED_ANNOTATION),
            )
            .await
            .map(|_| ());
        }
        self.settle(&istio_csr, result, &mut status).await
    }

    /// Record the result of a pass in the conditions and pick the outcome
    async fn settle(
        &self,
        istio_csr: &IstioCSR,
        result: Result<(), ReconcileError>,
        status: &mut StatusTracker,
    ) -> Result<Outcome, ReconcileError> {
        match result {
            Ok(()) => {
                status.mark_ready();
                status.persist(self.store.as_ref(), istio_csr).await?;
                info!("✅ Reconciliation successful");
                Ok(Outcome::Done)
            }
            Err(e) if e.is_multiple_instance() => Err(e),
            Err(e) if e.is_irrecoverable() => {
                error!(error = %e, "❌ Reconciliation failed with irrecoverable error, not retrying");
                status.mark_failed(&e);
                match status.persist(self.store.as_ref(), istio_csr).await {
                    Ok(()) => Err(e),
                    Err(status_err) => Err(e.aggregate([status_err])),
                }
            }
            Err(e) => {
                warn!(
                    error = %e,
                    delay_secs = self.config.requeue_delay.as_secs(),
                    "🔄 Reconciliation failed, retrying"
                );
                status.mark_progressing(&e);
                match status.persist(self.store.as_ref(), istio_csr).await {
                    Ok(()) => {
                        metrics::increment_reconciliation_errors(e.reason().as_str());
                        Ok(Outcome::RequeueAfter(self.config.requeue_delay))
                    }
                    Err(status_err) => Err(e.aggregate([status_err])),
                }
            }
        }
    }

    /// Release an IstioCSR being deleted; managed resources are left in place
    async fn finalize(
        &self,
        istio_csr: &IstioCSR,
        owner: &ObjectReference,
    ) -> Result<Outcome, ReconcileError> {
        if !istio_csr.has_finalizer(FINALIZER) {
            return Ok(Outcome::Done);
        }

        warn!("istiocsr is being deleted, istio-csr resources are not removed");
        self.events
            .publish(
                owner,
                EventType::Warning,
                reasons::REMOVE_DEPLOYMENT,
                actions::DELETE,
                Some(
                    "istiocsr deleted; the istio-csr deployment and its resources must be removed manually"
                        .to_string(),
                ),
            )
            .await;

        update_metadata(
            self.store.as_ref(),
            &self.config.conflict_retry,
            istio_csr,
            "remove finalizer",
            remove_finalizer,
        )
        .await?;
        info!("Removed finalizer from istiocsr");
        Ok(Outcome::Done)
    }
}
