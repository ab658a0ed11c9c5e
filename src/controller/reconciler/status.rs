//! # Status Management
//!
//! Condition bookkeeping and status writes for the IstioCSR.
//!
//! A pass works on a copy of the status and only writes it back when it
//! differs from what was last persisted, so an unchanged pass issues no
//! status write at all.

use crate::constants::*;
use crate::controller::store::ObjectStore;
use crate::crd::{Condition, IstioCSR, IstioCSRStatus};
use crate::error::ReconcileError;
use crate::observability::metrics;
use tracing::debug;

pub const STATUS_TRUE: &str = "True";
pub const STATUS_FALSE: &str = "False";

/// Insert or update the condition of `type_`
///
/// Returns false, leaving the list untouched, when an entry of that type
/// already has the same status and reason. Otherwise the entry is written
/// with a fresh transition time and true is returned.
pub fn set_condition(
    conditions: &mut Vec<Condition>,
    type_: &str,
    status: &str,
    reason: &str,
    message: &str,
) -> bool {
    let condition = Condition {
        r#type: type_.to_string(),
        status: status.to_string(),
        last_transition_time: Some(chrono::Utc::now().to_rfc3339()),
        reason: Some(reason.to_string()),
        message: Some(message.to_string()),
    };

    match conditions.iter_mut().find(|c| c.r#type == type_) {
        Some(existing)
            if existing.status == status && existing.reason.as_deref() == Some(reason) =>
        {
            false
        }
        Some(existing) => {
            *existing = condition;
            true
        }
        None => {
            conditions.push(condition);
            true
        }
    }
}

/// Look up a condition by type
pub fn find_condition<'a>(conditions: &'a [Condition], type_: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.r#type == type_)
}

/// Working copy of the status during one pass
#[derive(Debug, Clone)]
pub struct StatusTracker {
    persisted: IstioCSRStatus,
    pub status: IstioCSRStatus,
}

impl StatusTracker {
    pub fn new(istio_csr: &IstioCSR) -> Self {
        let persisted = istio_csr.status.clone().unwrap_or_default();
        Self {
            status: persisted.clone(),
            persisted,
        }
    }

    /// True when the working copy differs from the last persisted status
    pub fn is_dirty(&self) -> bool {
        self.status != self.persisted
    }

    pub fn set_condition(&mut self, type_: &str, status: &str, reason: &str, message: &str) -> bool {
        set_condition(&mut self.status.conditions, type_, status, reason, message)
    }

    pub fn mark_ready(&mut self) -> bool {
        let degraded = self.set_condition(CONDITION_DEGRADED, STATUS_FALSE, REASON_READY, "");
        let ready = self.set_condition(
            CONDITION_READY,
            STATUS_TRUE,
            REASON_READY,
            "reconciliation successful",
        );
        degraded || ready
    }

    pub fn mark_failed(&mut self, err: &ReconcileError) -> bool {
        let degraded = self.set_condition(
            CONDITION_DEGRADED,
            STATUS_TRUE,
            REASON_FAILED,
            &format!("reconciliation failed with irrecoverable error not retrying: {err}"),
        );
        let ready = self.set_condition(CONDITION_READY, STATUS_FALSE, REASON_FAILED, "");
        degraded || ready
    }

    pub fn mark_progressing(&mut self, err: &ReconcileError) -> bool {
        let degraded = self.set_condition(CONDITION_DEGRADED, STATUS_FALSE, REASON_READY, "");
        let ready = self.set_condition(
            CONDITION_READY,
            STATUS_FALSE,
            REASON_IN_PROGRESS,
            &format!("reconciliation failed, retrying: {err}"),
        );
        degraded || ready
    }

    pub fn mark_rejected(&mut self, message: &str) -> bool {
        self.set_condition(
            CONDITION_READY,
            STATUS_FALSE,
            REASON_MULTIPLE_INSTANCE,
            message,
        )
    }

    /// Write the working copy to the status subresource when it changed
    pub async fn persist(
        &mut self,
        store: &dyn ObjectStore,
        istio_csr: &IstioCSR,
    ) -> Result<(), ReconcileError> {
        if !self.is_dirty() {
            debug!("Skipping status update - status unchanged");
            return Ok(());
        }

        let mut updated = istio_csr.clone();
        updated.status = Some(self.status.clone());
        if let Err(e) = store.update_istio_csr_status(&updated).await {
            metrics::increment_status_write_errors();
            return Err(ReconcileError::from_client_error(
                e,
                "failed to update istiocsr status",
            ));
        }
        self.persisted = self.status.clone();
        Ok(())
    }
}
