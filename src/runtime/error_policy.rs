//! # Error Policy
//!
//! What the watch loop does with a pass that ended in an error.

use crate::controller::reconciler::Reconciler;
use crate::crd::IstioCSR;
use crate::error::ReconcileError;
use crate::observability;
use kube::runtime::controller::Action;
use std::sync::Arc;
use tracing::{error, info};

/// Map a failed pass to the next action
///
/// Irrecoverable and MultipleInstance errors wait for the IstioCSR to
/// change; anything else is requeued after the configured delay.
pub fn handle_reconciliation_error(
    obj: Arc<IstioCSR>,
    error: &ReconcileError,
    ctx: Arc<Reconciler>,
) -> Action {
    let name = obj.metadata.name.as_deref().unwrap_or("unknown");
    let namespace = obj.metadata.namespace.as_deref().unwrap_or("default");

    let error_span = tracing::span!(
        tracing::Level::ERROR,
        "controller.watch.reconciliation_error",
        resource.name = name,
        resource.namespace = namespace,
        reason = %error.reason(),
    );
    let _error_guard = error_span.enter();

    if error.is_irrecoverable() || error.is_multiple_instance() {
        error!("Reconciliation of {}/{} stopped: {}", namespace, name, error);
        return Action::await_change();
    }

    let delay = ctx.config.requeue_delay;
    info!(
        "🔄 Retrying {}/{} in {}s: {}",
        namespace,
        name,
        delay.as_secs(),
        error
    );
    observability::metrics::increment_requeues_total("error");
    Action::requeue(delay)
}
